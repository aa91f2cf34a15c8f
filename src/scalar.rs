// src/scalar.rs

use ndarray::LinalgScalar;
use ndarray_linalg::{Lapack, Scalar};
use std::fmt::Debug;

pub use ndarray_linalg::c64;

/// Element type of the matrices handled by the engine.
///
/// Implemented for `f64` (real pseudo-inverse) and `c64` (complex
/// pseudo-inverse, Hermitian transpose). Singular values and weights are
/// always real (`f64`).
pub trait PinvScalar:
    Scalar<Real = f64> + Lapack + LinalgScalar + Debug + Send + Sync + 'static
{
    /// `true` when matrices of this type are stored as `Real*`/`Imag*` column pairs.
    const IS_COMPLEX: bool;

    /// Builds an element from its real and imaginary parts. The imaginary
    /// part is dropped for real elements.
    fn from_parts(re: f64, im: f64) -> Self;

    /// Real and imaginary parts of the element.
    fn parts(self) -> (f64, f64) {
        (self.re(), self.im())
    }

    /// Multiplies the element by a real factor.
    fn scale(self, factor: f64) -> Self {
        self.mul_real(factor)
    }

    /// Modulus of the element.
    fn modulus(self) -> f64 {
        self.abs()
    }
}

impl PinvScalar for f64 {
    const IS_COMPLEX: bool = false;

    fn from_parts(re: f64, _im: f64) -> Self {
        re
    }
}

impl PinvScalar for c64 {
    const IS_COMPLEX: bool = true;

    fn from_parts(re: f64, im: f64) -> Self {
        c64::new(re, im)
    }
}
