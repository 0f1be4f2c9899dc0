//! Boolean operators over two operands.
//!
//! An operator is a 4-bit truth-table code `c_ba c_b c_a c_k` evaluating
//! `f(a, b) = (c_ba·a·b) ⊕ (c_b·b) ⊕ (c_a·a) ⊕ c_k`. The sixteen codes cover every
//! function of two booleans; the low bit complements the result.

/// A boolean function of the two operands of a combined solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Operation {
    EmptySet = 0b0000,
    AllSpace = 0b0001,
    SetA = 0b0010,
    ComplementA = 0b0011,
    SetB = 0b0100,
    ComplementB = 0b0101,
    SymmetricDifference = 0b0110,
    ComplementSymmetricDifference = 0b0111,
    Intersection = 0b1000,
    ComplementIntersection = 0b1001,
    AMinusB = 0b1010,
    ComplementAMinusB = 0b1011,
    BMinusA = 0b1100,
    ComplementBMinusA = 0b1101,
    Union = 0b1110,
    ComplementUnion = 0b1111,
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Operation::EmptySet,
        Operation::AllSpace,
        Operation::SetA,
        Operation::ComplementA,
        Operation::SetB,
        Operation::ComplementB,
        Operation::SymmetricDifference,
        Operation::ComplementSymmetricDifference,
        Operation::Intersection,
        Operation::ComplementIntersection,
        Operation::AMinusB,
        Operation::ComplementAMinusB,
        Operation::BMinusA,
        Operation::ComplementBMinusA,
        Operation::Union,
        Operation::ComplementUnion,
    ];

    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_code(code: u32) -> Option<Operation> {
        if code < 16 {
            Some(Self::ALL[code as usize])
        } else {
            None
        }
    }

    /// The operator whose result is the complement of this one's.
    pub const fn complement(self) -> Operation {
        Self::ALL[(self.code() ^ 1) as usize]
    }

    /// Evaluate on a packed combined side: bit 0 is operand A, bit 1 operand B.
    #[inline]
    pub const fn apply(self, side: u32) -> u32 {
        let a = side & 1;
        let b = (side >> 1) & 1;
        let code = self.code();
        let c_ba = (code >> 3) & 1;
        let c_b = (code >> 2) & 1;
        let c_a = (code >> 1) & 1;
        let c_k = code & 1;
        (c_ba & a & b) ^ (c_b & b) ^ (c_a & a) ^ c_k
    }

    #[inline]
    pub const fn evaluate(self, a: bool, b: bool) -> bool {
        self.apply((a as u32) | ((b as u32) << 1)) != 0
    }
}
