//! Random source capability used to shuffle triangles before a build

use crate::float_types::Real;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed of the default random source. Builds without a caller-supplied
/// source are deterministic.
pub const DEFAULT_SEED: u64 = 0x5eed_b5bc;

pub trait UserRandom {
    /// Uniform over the full `u32` range.
    fn get_int(&mut self) -> u32;
    /// Uniform in `[min, max)`.
    fn get_real(&mut self, min: Real, max: Real) -> Real;
}

impl<R: RngCore> UserRandom for R {
    fn get_int(&mut self) -> u32 {
        self.next_u32()
    }

    fn get_real(&mut self, min: Real, max: Real) -> Real {
        if min < max { Rng::random_range(self, min..max) } else { min }
    }
}

/// The random source used when the caller supplies none.
pub fn default_random() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(DEFAULT_SEED)
}

/// Adapts a caller-supplied [`UserRandom`] to the `rand` traits.
struct UserRng<'a>(&'a mut dyn UserRandom);

impl RngCore for UserRng<'_> {
    fn next_u32(&mut self) -> u32 {
        self.0.get_int()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.0.get_int()) << 32) | u64::from(self.0.get_int())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.0.get_int().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

pub(crate) fn shuffle<T>(items: &mut [T], random: &mut dyn UserRandom) {
    items.shuffle(&mut UserRng(random));
}
