// src/linalg_backends.rs

#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

// --- Common imports needed by multiple sections ---
use crate::error::ThreadSafeStdError;
use crate::scalar::{c64, PinvScalar};
use ndarray::{Array1, Array2, ShapeBuilder};
use std::marker::PhantomData;

// --- Trait Definitions ---

/// Output of a thin (economy) Singular Value Decomposition, `A = U · diag(s) · V*`.
#[derive(Debug, Clone)]
pub struct ThinSvd<F: 'static> {
    /// Left singular vectors as columns. Shape: `(m, k)`
    pub u: Array2<F>,
    /// Singular values, nonnegative and nonincreasing. Shape: `(k)`
    pub s: Array1<f64>,
    /// Right singular vectors as columns (not transposed). Shape: `(n, k)`
    pub v: Array2<F>,
}

impl<F: PinvScalar> ThinSvd<F> {
    /// An empty factorization of an m×n matrix with `min(m, n) == 0`.
    pub fn empty(nrows: usize, ncols: usize) -> Self {
        let k = nrows.min(ncols);
        Self {
            u: Array2::zeros((nrows, k).f()),
            s: Array1::zeros(k),
            v: Array2::zeros((ncols, k).f()),
        }
    }

}

/// Trait for the thin Singular Value Decomposition.
///
/// The input matrix is consumed; callers must copy it beforehand if they
/// still need its contents.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    fn svd_thin(&self, matrix: Array2<F>) -> Result<ThinSvd<F>, ThreadSafeStdError>;
}

// --- NdarrayLinAlgBackend Implementation ---
use ndarray_linalg::{JobSvd, SVDDCInto as NdLinalgSVDDCInto};

/// LAPACK-backed implementation through ndarray-linalg (`*gesdd`, economy vectors).
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

// Helper to convert ndarray-linalg's error to Box<dyn Error + Send + Sync>
fn to_dyn_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

/// Clamps round-off negatives; LAPACK already returns values in nonincreasing order.
fn sanitize_singular_values(mut s: Array1<f64>) -> Array1<f64> {
    s.mapv_inplace(|x| if x < 0.0 { 0.0 } else { x });
    s
}

impl<F: PinvScalar> BackendSVD<F> for NdarrayLinAlgBackend {
    fn svd_thin(&self, matrix: Array2<F>) -> Result<ThinSvd<F>, ThreadSafeStdError> {
        let (nrows, ncols) = matrix.dim();
        let k = nrows.min(ncols);
        if k == 0 {
            return Ok(ThinSvd::empty(nrows, ncols));
        }
        // JobSvd::Some gives U (m×k) and V^H (k×n) directly.
        let (u, s, vt) = matrix.svddc_into(JobSvd::Some).map_err(to_dyn_error)?;
        let u = u.ok_or("LAPACK SVD did not return U")?;
        let vt = vt.ok_or("LAPACK SVD did not return V^H")?;
        if u.dim() != (nrows, k) || vt.dim() != (k, ncols) {
            return Err(format!(
                "LAPACK SVD returned U {:?} and V^H {:?} for a {}x{} matrix",
                u.dim(),
                vt.dim(),
                nrows,
                ncols
            )
            .into());
        }
        let v = vt.t().mapv(|x| x.conj());
        Ok(ThinSvd { u, s: sanitize_singular_values(s), v })
    }
}


// --- FaerLinAlgBackend Implementation ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code { // Encapsulate faer-specific code and its imports
    use super::{sanitize_singular_values, BackendSVD, ThinSvd};
    use crate::error::ThreadSafeStdError;
    use ndarray::{Array1, Array2, ShapeBuilder};
    use faer::MatRef;
    use faer::linalg::solvers::Svd as FaerSolverSvd;

    fn to_dyn_error_faer(msg: String) -> ThreadSafeStdError {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn faer_mat_to_ndarray(faer_mat: MatRef<'_, f64>) -> Array2<f64> {
        let nrows = faer_mat.nrows();
        let ncols = faer_mat.ncols();
        Array2::from_shape_fn((nrows, ncols).f(), |(i, j)| faer_mat[(i, j)])
    }

    fn faer_col_to_ndarray_vec(faer_col: faer::ColRef<'_, f64>) -> Array1<f64> {
        Array1::from_shape_fn(faer_col.nrows(), |i| faer_col[i])
    }

    impl BackendSVD<f64> for FaerLinAlgBackend {
        fn svd_thin(&self, matrix: Array2<f64>) -> Result<ThinSvd<f64>, ThreadSafeStdError> {
            let (nrows, ncols) = matrix.dim();
            if nrows.min(ncols) == 0 {
                return Ok(ThinSvd::empty(nrows, ncols));
            }
            let matrix_view = matrix.view();

            let faer_mat_view = if matrix_view.is_standard_layout() { // C-order (row-major)
                if let Some(slice) = matrix_view.as_slice_memory_order() {
                    faer::MatRef::from_row_major_slice(slice, nrows, ncols)
                } else {
                    return Err(to_dyn_error_faer(format!(
                        "Failed to get slice from row-major ndarray matrix ({}x{})", nrows, ncols
                    )));
                }
            } else if matrix_view.t().is_standard_layout() { // Fortran-order (column-major)
                if let Some(slice) = matrix_view.as_slice_memory_order() {
                    faer::MatRef::from_column_major_slice(slice, nrows, ncols)
                } else {
                    return Err(to_dyn_error_faer(format!(
                        "Failed to get slice from column-major ndarray matrix ({}x{})", nrows, ncols
                    )));
                }
            } else {
                return Err(to_dyn_error_faer(format!(
                    "Input ndarray matrix ({}x{}) is non-contiguous and cannot be directly viewed by faer. Consider making a contiguous copy.", nrows, ncols
                )));
            };

            let svd_solver_instance = FaerSolverSvd::new_thin(faer_mat_view)
                .map_err(|e| to_dyn_error_faer(format!("Faer SVD computation failed: {:?}", e)))?;

            let s_ndarray = faer_col_to_ndarray_vec(svd_solver_instance.S().column_vector());
            let u_ndarray = faer_mat_to_ndarray(svd_solver_instance.U());
            let v_ndarray = faer_mat_to_ndarray(svd_solver_instance.V());

            Ok(ThinSvd { u: u_ndarray, s: sanitize_singular_values(s_ndarray), v: v_ndarray })
        }
    }
} // End of faer_specific_code module

#[cfg(feature = "backend_faer")]
pub use self::faer_specific_code::FaerLinAlgBackend;

// --- LinAlgBackendProvider Dispatch ---

/// Real matrices go to faer when `backend_faer` is enabled, otherwise to LAPACK.
impl BackendSVD<f64> for LinAlgBackendProvider<f64> {
    fn svd_thin(&self, matrix: Array2<f64>) -> Result<ThinSvd<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.svd_thin(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.svd_thin(matrix)
        }
    }
}

/// Complex matrices always use the LAPACK backend (`zgesdd`).
impl BackendSVD<c64> for LinAlgBackendProvider<c64> {
    fn svd_thin(&self, matrix: Array2<c64>) -> Result<ThinSvd<c64>, ThreadSafeStdError> {
        NdarrayLinAlgBackend.svd_thin(matrix)
    }
}

// --- Kernel Thread Control ---

#[cfg(any(
    feature = "backend_openblas",
    feature = "backend_openblas_system",
    feature = "faer_links_ndarray_static_openblas"
))]
mod openblas_threads {
    use std::os::raw::c_int;

    extern "C" {
        fn openblas_set_num_threads(num_threads: c_int);
        fn openblas_get_num_threads() -> c_int;
    }

    pub(super) fn get() -> Option<usize> {
        // SAFETY: both entry points exist in threaded and single-threaded OpenBLAS builds.
        usize::try_from(unsafe { openblas_get_num_threads() }).ok()
    }

    pub(super) fn set(threads: usize) {
        let threads = c_int::try_from(threads).unwrap_or(c_int::MAX);
        // SAFETY: see `get`.
        unsafe { openblas_set_num_threads(threads) }
    }
}

/// Threads of the linked BLAS/LAPACK library, or `None` when it cannot be
/// controlled at runtime. MKL builds follow `MKL_NUM_THREADS`.
pub fn blas_threads() -> Option<usize> {
    #[cfg(any(
        feature = "backend_openblas",
        feature = "backend_openblas_system",
        feature = "faer_links_ndarray_static_openblas"
    ))]
    {
        openblas_threads::get()
    }
    #[cfg(not(any(
        feature = "backend_openblas",
        feature = "backend_openblas_system",
        feature = "faer_links_ndarray_static_openblas"
    )))]
    {
        None
    }
}

/// Sets the BLAS/LAPACK thread count and returns the previous one. Returns
/// `None` and changes nothing when the library offers no runtime control.
/// Single-threaded OpenBLAS builds accept the call and stay at one thread.
pub fn set_blas_threads(threads: usize) -> Option<usize> {
    let previous = blas_threads()?;
    #[cfg(any(
        feature = "backend_openblas",
        feature = "backend_openblas_system",
        feature = "faer_links_ndarray_static_openblas"
    ))]
    openblas_threads::set(threads.max(1));
    #[cfg(not(any(
        feature = "backend_openblas",
        feature = "backend_openblas_system",
        feature = "faer_links_ndarray_static_openblas"
    )))]
    let _ = threads;
    Some(previous)
}
