// Re-export parry for the appropriate float size
#[cfg(feature = "f64")]
pub use parry3d_f64 as parry3d;

#[cfg(feature = "f32")]
pub use parry3d;

// Our Real scalar type:
#[cfg(feature = "f32")]
pub type Real = f32;
#[cfg(feature = "f64")]
pub type Real = f64;

/// Working epsilon for exact-zero tests on derived quantities
/// (plane-pair determinants, interpolator denominators).
#[cfg(feature = "f32")]
pub const EPSILON: Real = 1e-6;
/// Working epsilon for exact-zero tests on derived quantities
/// (plane-pair determinants, interpolator denominators).
#[cfg(feature = "f64")]
pub const EPSILON: Real = 1e-9;

/// Tolerance used by the half-space feasibility tester. Scaled by
/// `max(1, |x|²)` at the point where it is applied.
#[cfg(feature = "f32")]
pub const FEASIBILITY_EPSILON: Real = 1e-5;
/// Tolerance used by the half-space feasibility tester. Scaled by
/// `max(1, |x|²)` at the point where it is applied.
#[cfg(feature = "f64")]
pub const FEASIBILITY_EPSILON: Real = 1e-10;

/// Tolerance for treating a matrix as the identity.
pub const IDENTITY_TOLERANCE: Real = 10.0 * f32::EPSILON as Real;

// Pi
/// Archimedes' constant (π)
#[cfg(feature = "f32")]
pub const PI: Real = core::f32::consts::PI;
/// Archimedes' constant (π)
#[cfg(feature = "f64")]
pub const PI: Real = core::f64::consts::PI;

// Frac Pi 2
/// π/2
#[cfg(feature = "f32")]
pub const FRAC_PI_2: Real = core::f32::consts::FRAC_PI_2;
/// π/2
#[cfg(feature = "f64")]
pub const FRAC_PI_2: Real = core::f64::consts::FRAC_PI_2;

// Tau
/// The full circle constant (τ)
#[cfg(feature = "f32")]
pub const TAU: Real = core::f32::consts::TAU;
/// The full circle constant (τ)
#[cfg(feature = "f64")]
pub const TAU: Real = core::f64::consts::TAU;
