// src/matrix_buffer.rs

use crate::error::PinvError;
use crate::scalar::PinvScalar;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2, ShapeBuilder};

/// Dense m×n matrix stored in column-major order.
///
/// The column-major layout matches what LAPACK-style kernels expect, so
/// columns are contiguous and `view_column` never copies. Row-wise access goes
/// through `get`/`set`, which translate the index.
#[derive(Debug, Clone)]
pub struct MatrixBuffer<F> {
    data: Array2<F>,
}

impl<F: PinvScalar> Default for MatrixBuffer<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F: PinvScalar> MatrixBuffer<F> {
    /// A released (0×0) buffer.
    pub fn empty() -> Self {
        Self { data: Array2::zeros((0, 0).f()) }
    }

    /// Allocates a zero-filled m×n buffer.
    ///
    /// # Errors
    /// `OutOfMemory` when `m * n` overflows or the storage cannot be reserved.
    pub fn allocate(rows: usize, cols: usize) -> Result<Self, PinvError> {
        Ok(Self { data: zeroed_storage(rows, cols)? })
    }

    /// Wraps an existing matrix, converting it to column-major order if needed.
    pub fn from_array(matrix: Array2<F>) -> Self {
        if matrix.t().is_standard_layout() {
            return Self { data: matrix };
        }
        let (rows, cols) = matrix.dim();
        let mut data = Array2::zeros((rows, cols).f());
        data.assign(&matrix);
        Self { data }
    }

    /// Frees the storage. Calling it on a released buffer is a no-op.
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }
        self.data = Array2::zeros((0, 0).f());
    }

    pub fn is_released(&self) -> bool {
        self.data.dim() == (0, 0)
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Makes the buffer m×n. Storage is kept when the shape repeats and the
    /// contents are left untouched in that case; otherwise the old storage is
    /// dropped and a zeroed buffer allocated. Returns `true` on reallocation.
    pub fn ensure_shape(&mut self, rows: usize, cols: usize) -> Result<bool, PinvError> {
        if self.data.dim() == (rows, cols) {
            return Ok(false);
        }
        // Drop first so the old and new blocks are never alive together.
        self.release();
        self.data = zeroed_storage(rows, cols)?;
        Ok(true)
    }

    /// Copies `source` into the buffer, reusing the storage when shapes match.
    pub fn assign(&mut self, source: ArrayView2<'_, F>) -> Result<bool, PinvError> {
        let (rows, cols) = source.dim();
        let reallocated = self.ensure_shape(rows, cols)?;
        self.data.assign(&source);
        Ok(reallocated)
    }

    /// Contiguous view of column `j`.
    ///
    /// # Panics
    /// Panics if `j >= ncols()`.
    pub fn view_column(&self, j: usize) -> ArrayView1<'_, F> {
        self.data.column(j)
    }

    /// Element at row `i`, column `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<F> {
        self.data.get((i, j)).copied()
    }

    /// Sets the element at row `i`, column `j`. Returns `false` if out of bounds.
    pub fn set(&mut self, i: usize, j: usize, value: F) -> bool {
        match self.data.get_mut((i, j)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn view(&self) -> ArrayView2<'_, F> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, F> {
        self.data.view_mut()
    }

    /// Hands the matrix to a consumer and leaves the buffer released.
    pub fn take(&mut self) -> Array2<F> {
        std::mem::replace(&mut self.data, Array2::zeros((0, 0).f()))
    }

    /// Column-major backing slice.
    pub fn as_column_major_slice(&self) -> Option<&[F]> {
        if self.data.t().is_standard_layout() {
            self.data.as_slice_memory_order()
        } else {
            None
        }
    }
}

/// Zero-filled column-major storage, reporting allocation failure instead of aborting.
pub(crate) fn zeroed_storage<F: PinvScalar>(rows: usize, cols: usize) -> Result<Array2<F>, PinvError> {
    let len = rows
        .checked_mul(cols)
        .ok_or(PinvError::OutOfMemory { rows, cols })?;
    let mut storage: Vec<F> = Vec::new();
    storage
        .try_reserve_exact(len)
        .map_err(|_| PinvError::OutOfMemory { rows, cols })?;
    storage.resize(len, F::zero());
    Ok(Array2::from_shape_vec((rows, cols).f(), storage)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::c64;
    use ndarray::array;

    #[test]
    fn allocate_is_zeroed_and_column_major() {
        let mut buffer = MatrixBuffer::<f64>::allocate(3, 2).unwrap();
        assert_eq!(buffer.dim(), (3, 2));
        assert!(buffer.view().iter().all(|&x| x == 0.0));

        assert!(buffer.set(0, 1, 5.0));
        assert!(buffer.set(2, 0, 7.0));
        assert!(!buffer.set(3, 0, 1.0));
        assert_eq!(buffer.get(0, 1), Some(5.0));
        assert_eq!(buffer.get(5, 5), None);

        let slice = buffer.as_column_major_slice().unwrap();
        assert_eq!(slice, &[0.0, 0.0, 7.0, 5.0, 0.0, 0.0]);
        assert_eq!(buffer.view_column(1).to_vec(), vec![5.0, 0.0, 0.0]);
    }

    #[test]
    fn release_is_idempotent() {
        let mut buffer = MatrixBuffer::<c64>::allocate(2, 2).unwrap();
        buffer.release();
        assert!(buffer.is_released());
        buffer.release();
        assert!(buffer.is_released());
    }

    #[test]
    fn overflowing_shape_reports_out_of_memory() {
        match MatrixBuffer::<f64>::allocate(usize::MAX, 2) {
            Err(PinvError::OutOfMemory { rows, cols }) => {
                assert_eq!(rows, usize::MAX);
                assert_eq!(cols, 2);
            }
            other => panic!("expected OutOfMemory, got {:?}", other.map(|b| b.dim())),
        }
    }

    #[test]
    fn ensure_shape_reuses_storage_when_shape_repeats() {
        let mut buffer = MatrixBuffer::<f64>::allocate(2, 3).unwrap();
        assert!(!buffer.ensure_shape(2, 3).unwrap());
        assert!(buffer.ensure_shape(3, 2).unwrap());
        assert_eq!(buffer.dim(), (3, 2));
    }

    #[test]
    fn assign_and_take() {
        let mut buffer = MatrixBuffer::<f64>::empty();
        let source = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(buffer.assign(source.view()).unwrap());
        assert!(!buffer.assign(source.view()).unwrap());
        assert_eq!(buffer.get(1, 0), Some(3.0));

        let taken = buffer.take();
        assert_eq!(taken, source);
        assert!(buffer.is_released());
    }

    #[test]
    fn from_row_major_array_converts_layout() {
        let buffer = MatrixBuffer::from_array(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(buffer.as_column_major_slice().unwrap(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }
}
