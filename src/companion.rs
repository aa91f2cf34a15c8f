// src/companion.rs

use crate::error::PinvError;
use crate::matrix_buffer::MatrixBuffer;
use crate::scalar::PinvScalar;
use ndarray::linalg::general_mat_mul;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Which product of the pseudo-inverse with the companion matrix B is emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiplyMode {
    /// Emit A+ itself.
    #[default]
    None,
    /// P = A+ · B; B has m rows.
    Post,
    /// P = B · A+; B has n columns.
    Pre,
}

impl MultiplyMode {
    pub fn needs_companion(self) -> bool {
        !matches!(self, MultiplyMode::None)
    }

    /// Shape of P for an n×m inverse and the given companion shape.
    pub fn product_shape(self, inverse: (usize, usize), companion: (usize, usize)) -> Result<(usize, usize), PinvError> {
        let (n, m) = inverse;
        match self {
            MultiplyMode::None => Ok((n, m)),
            MultiplyMode::Post if companion.0 == m => Ok((n, companion.1)),
            MultiplyMode::Post => Err(PinvError::ShapeMismatch(format!(
                "post-multiply needs a companion with {} rows, got {}x{}",
                m, companion.0, companion.1
            ))),
            MultiplyMode::Pre if companion.1 == n => Ok((companion.0, m)),
            MultiplyMode::Pre => Err(PinvError::ShapeMismatch(format!(
                "pre-multiply needs a companion with {} columns, got {}x{}",
                n, companion.0, companion.1
            ))),
        }
    }
}

/// Forms the product selected by `mode` into `out`.
pub fn multiply<F: PinvScalar>(
    mode: MultiplyMode,
    inverse: ArrayView2<'_, F>,
    companion: ArrayView2<'_, F>,
    out: &mut MatrixBuffer<F>,
) -> Result<(), PinvError> {
    let (rows, cols) = mode.product_shape(inverse.dim(), companion.dim())?;
    out.ensure_shape(rows, cols)?;
    match mode {
        MultiplyMode::None => {
            out.assign(inverse)?;
        }
        MultiplyMode::Post => general_mat_mul(F::one(), &inverse, &companion, F::zero(), &mut out.view_mut()),
        MultiplyMode::Pre => general_mat_mul(F::one(), &companion, &inverse, F::zero(), &mut out.view_mut()),
    }
    Ok(())
}

/// Companion page chosen for an input page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionPage {
    /// The page with the same index.
    Matching(usize),
    /// The last companion page, reused because the companion ran out.
    ReusedLast(usize),
    /// No page available; processing stops.
    Exhausted,
}

/// Pairs input page `page` with a companion page.
pub fn select_companion_page(page: usize, companion_pages: usize, reuse_last: bool) -> CompanionPage {
    if page < companion_pages {
        CompanionPage::Matching(page)
    } else if reuse_last && companion_pages > 0 {
        CompanionPage::ReusedLast(companion_pages - 1)
    } else {
        CompanionPage::Exhausted
    }
}
