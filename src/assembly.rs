// src/assembly.rs

use crate::error::PinvError;
use crate::matrix_buffer::MatrixBuffer;
use crate::scalar::PinvScalar;
use ndarray::linalg::general_mat_mul;
use ndarray::{ArrayView1, ArrayView2, Zip};

fn check_factors<F: PinvScalar>(
    u: &ArrayView2<'_, F>,
    diagonal: &ArrayView1<'_, f64>,
    v: &ArrayView2<'_, F>,
) -> Result<(), PinvError> {
    let k = diagonal.len();
    if u.ncols() != k || v.ncols() != k {
        return Err(PinvError::ShapeMismatch(format!(
            "factors U {:?} and V {:?} do not match {} singular values",
            u.dim(),
            v.dim(),
            k
        )));
    }
    Ok(())
}

/// Writes `conj(x) * diag(d)` into `scratch`.
fn conj_scaled_into<F: PinvScalar>(
    x: &ArrayView2<'_, F>,
    diagonal: &ArrayView1<'_, f64>,
    scratch: &mut MatrixBuffer<F>,
) -> Result<(), PinvError> {
    let (rows, k) = x.dim();
    scratch.ensure_shape(rows, k)?;
    let mut target = scratch.view_mut();
    for ((mut out_col, in_col), &d) in target
        .columns_mut()
        .into_iter()
        .zip(x.columns())
        .zip(diagonal.iter())
    {
        Zip::from(&mut out_col).and(&in_col).for_each(|o, &i| *o = i.conj().scale(d));
    }
    Ok(())
}

/// `A+ = V diag(inverse) U*` into `out` (n×m).
///
/// Computed as `V (U diag(inverse))*` with one BLAS-3 product;
/// `scratch` holds the scaled left factor (m×k).
pub fn assemble_inverse<F: PinvScalar>(
    u: ArrayView2<'_, F>,
    inverse: ArrayView1<'_, f64>,
    v: ArrayView2<'_, F>,
    scratch: &mut MatrixBuffer<F>,
    out: &mut MatrixBuffer<F>,
) -> Result<(), PinvError> {
    check_factors(&u, &inverse, &v)?;
    conj_scaled_into(&u, &inverse, scratch)?;
    out.ensure_shape(v.nrows(), u.nrows())?;
    general_mat_mul(F::one(), &v, &scratch.view().reversed_axes(), F::zero(), &mut out.view_mut());
    Ok(())
}

/// `A_rec = U diag(used) V*` into `out` (m×n).
pub fn reconstruct<F: PinvScalar>(
    u: ArrayView2<'_, F>,
    used: ArrayView1<'_, f64>,
    v: ArrayView2<'_, F>,
    scratch: &mut MatrixBuffer<F>,
    out: &mut MatrixBuffer<F>,
) -> Result<(), PinvError> {
    check_factors(&u, &used, &v)?;
    conj_scaled_into(&v, &used, scratch)?;
    out.ensure_shape(u.nrows(), v.nrows())?;
    general_mat_mul(F::one(), &u, &scratch.view().reversed_axes(), F::zero(), &mut out.view_mut());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::c64;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn inverse_of_diagonal_factorization() {
        let u = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let v = array![[0.0, 1.0], [1.0, 0.0]];
        let inverse = array![0.5, 0.25];
        let mut scratch = MatrixBuffer::empty();
        let mut out = MatrixBuffer::empty();
        assemble_inverse(u.view(), inverse.view(), v.view(), &mut scratch, &mut out).unwrap();
        assert_eq!(out.dim(), (2, 3));
        assert_eq!(out.view(), array![[0.0, 0.25, 0.0], [0.5, 0.0, 0.0]].view());
    }

    #[test]
    fn complex_assembly_uses_conjugate_transpose() {
        // A = u s v^H with u = [i], v = [1]: A = [i * 2], A+ = [-i / 2].
        let u = array![[c64::new(0.0, 1.0)]];
        let v = array![[c64::new(1.0, 0.0)]];
        let mut scratch = MatrixBuffer::empty();
        let mut out = MatrixBuffer::empty();
        assemble_inverse(u.view(), array![0.5].view(), v.view(), &mut scratch, &mut out).unwrap();
        let value = out.get(0, 0).unwrap();
        assert_abs_diff_eq!(value.re, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(value.im, -0.5, epsilon = 1e-15);

        reconstruct(u.view(), array![2.0].view(), v.view(), &mut scratch, &mut out).unwrap();
        assert_eq!(out.get(0, 0), Some(c64::new(0.0, 2.0)));
    }

    #[test]
    fn reconstruction_drops_suppressed_triplets() {
        let u = array![[1.0, 0.0], [0.0, 1.0]];
        let v = array![[1.0, 0.0], [0.0, 1.0]];
        let used = array![3.0, 0.0];
        let mut scratch = MatrixBuffer::empty();
        let mut out = MatrixBuffer::empty();
        reconstruct(u.view(), used.view(), v.view(), &mut scratch, &mut out).unwrap();
        assert_eq!(out.view(), array![[3.0, 0.0], [0.0, 0.0]].view());
    }

    #[test]
    fn mismatched_factors_are_rejected() {
        let u = array![[1.0, 0.0]];
        let v = array![[1.0]];
        let mut scratch = MatrixBuffer::empty();
        let mut out = MatrixBuffer::empty();
        let result = assemble_inverse(u.view(), array![1.0, 1.0].view(), v.view(), &mut scratch, &mut out);
        assert!(matches!(result, Err(PinvError::ShapeMismatch(_))));
    }
}
