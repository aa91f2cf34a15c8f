// src/regularization.rs

use crate::error::{EngineWarning, PinvError, WarningSink};
use crate::scalar::PinvScalar;
use log::{debug, trace};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Alpha used by Tikhonov filtering when no usable parameter is available.
pub const DEFAULT_TIKHONOV_ALPHA: f64 = 0.01;

/// Threshold factor for DC detection: `|sum_j v_i[j]| > DC_THRESHOLD_FACTOR * sqrt(n)`.
pub const DC_THRESHOLD_FACTOR: f64 = 0.1;

/// Tikhonov filter parameterization. Retained values are inverted as
/// `s / (s^2 + alpha^2)` instead of `1 / s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tikhonov {
    /// Fixed alpha.
    Alpha(f64),
    /// Alpha is the p-th singular value (1-based).
    SingularValueIndex(usize),
    /// Alpha is `beta * max(s)`.
    Beta(f64),
}

/// Tikhonov filtering with no parameter given uses `DEFAULT_TIKHONOV_ALPHA`.
impl Default for Tikhonov {
    fn default() -> Self {
        Tikhonov::Alpha(DEFAULT_TIKHONOV_ALPHA)
    }
}

/// Selection of singular values used to build the inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularizationConfig {
    /// Suppress `s[i]` with `s[i] / s_max_nonzero < min_ratio`. 0 disables.
    pub min_ratio: f64,
    /// Keep only the first `keep_largest` values. 0 disables.
    pub keep_largest: usize,
    /// Drop the last `drop_smallest` values. 0 disables.
    pub drop_smallest: usize,
    /// Explicit indices to suppress. Indices beyond the spectrum are ignored.
    pub delete_indices: Vec<usize>,
    pub tikhonov: Option<Tikhonov>,
    /// Suppress near-constant right singular vectors.
    pub remove_dc_vectors: bool,
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            min_ratio: 0.0,
            keep_largest: 0,
            drop_smallest: 0,
            delete_indices: Vec::new(),
            tikhonov: None,
            remove_dc_vectors: false,
        }
    }
}

impl RegularizationConfig {
    /// Checks option combinations before any data is read.
    pub fn validate(&self) -> Result<(), PinvError> {
        if !self.min_ratio.is_finite() || !(0.0..=1.0).contains(&self.min_ratio) {
            return Err(PinvError::ConfigConflict(format!(
                "min_ratio must lie in [0, 1], got {}",
                self.min_ratio
            )));
        }
        let ratio_on = self.min_ratio > 0.0;
        let largest_on = self.keep_largest > 0;
        let smallest_on = self.drop_smallest > 0;
        if [ratio_on, largest_on, smallest_on].iter().filter(|&&on| on).count() > 1 {
            return Err(PinvError::ConfigConflict(
                "only one of min_ratio, keep_largest and drop_smallest may be given".to_string(),
            ));
        }
        match self.tikhonov {
            Some(Tikhonov::Alpha(alpha)) if !alpha.is_finite() || alpha < 0.0 => Err(
                PinvError::ConfigConflict(format!("Tikhonov alpha must be a nonnegative number, got {}", alpha)),
            ),
            Some(Tikhonov::Beta(beta)) if !beta.is_finite() || beta < 0.0 => Err(
                PinvError::ConfigConflict(format!("Tikhonov beta must be a nonnegative number, got {}", beta)),
            ),
            Some(Tikhonov::SingularValueIndex(0)) => Err(PinvError::ConfigConflict(
                "Tikhonov singular value number is 1-based and must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Per-page record of what the regularization did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegularizationDiagnostics {
    /// Number of singular values retained.
    pub retained: usize,
    /// Largest over smallest retained singular value.
    pub condition_number: f64,
    /// Explicitly deleted indices (in range), ascending, without repeats.
    pub deleted_indices: Vec<usize>,
    /// Indices suppressed as DC vectors.
    pub dc_suppressed: Vec<usize>,
    /// Effective Tikhonov alpha; 0 when no filter is applied.
    pub tikhonov_alpha: f64,
    /// Largest nonzero singular value after DC removal.
    pub reference_singular_value: f64,
}

impl RegularizationDiagnostics {
    /// Space-separated list of the deleted indices, e.g. `"0 3"`.
    pub fn deleted_vectors_label(&self) -> String {
        self.deleted_indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegularizedSpectrum {
    /// Inverse singular values, zero at suppressed indices.
    pub inverse: Array1<f64>,
    /// Singular values with suppressed entries zeroed.
    pub used: Array1<f64>,
    pub diagnostics: RegularizationDiagnostics,
}

/// Indices of right singular vectors whose entries sum to more than `0.1 * sqrt(n)`.
pub fn dc_vector_indices<F: PinvScalar>(v: ArrayView2<'_, F>) -> Vec<usize> {
    let n = v.nrows();
    let threshold = DC_THRESHOLD_FACTOR * (n as f64).sqrt();
    v.columns()
        .into_iter()
        .enumerate()
        .filter(|(_, column)| column.sum().modulus() > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Applies the regularization policy to singular values `s` with right
/// singular vectors `v` (columns).
///
/// Suppression happens in this order: exact zeros, `min_ratio`,
/// `keep_largest`, `drop_smallest`, then `delete_indices`. The ratio
/// reference is the first nonzero value after DC removal.
///
/// # Errors
/// `DegenerateMatrix` when `s` has no nonzero entry, or when nothing is
/// left to invert.
pub fn regularize<F: PinvScalar>(
    s: ArrayView1<'_, f64>,
    v: ArrayView2<'_, F>,
    config: &RegularizationConfig,
    warnings: &mut WarningSink,
) -> Result<RegularizedSpectrum, PinvError> {
    let k = s.len();
    if !s.iter().any(|&x| x != 0.0) {
        return Err(PinvError::DegenerateMatrix(
            "no nonzero singular values found, unable to form the inverse".to_string(),
        ));
    }

    let mut masked = s.to_owned();
    let dc_suppressed = if config.remove_dc_vectors {
        let dc = dc_vector_indices(v);
        for &i in dc.iter().filter(|&&i| i < k) {
            masked[i] = 0.0;
        }
        if !dc.is_empty() {
            debug!("DC removal suppressed singular vectors {:?}", dc);
        }
        dc
    } else {
        Vec::new()
    };

    let reference = masked.iter().copied().find(|&x| x != 0.0).ok_or_else(|| {
        PinvError::DegenerateMatrix("every singular vector was removed as a DC vector".to_string())
    })?;

    let tikhonov_alpha = match config.tikhonov {
        None => None,
        Some(Tikhonov::Alpha(alpha)) => Some(alpha),
        Some(Tikhonov::SingularValueIndex(p)) if (1..=k).contains(&p) => Some(masked[p - 1]),
        Some(Tikhonov::SingularValueIndex(p)) => {
            warnings.emit(EngineWarning::TikhonovIndexOutOfRange {
                requested: p,
                available: k,
                fallback_alpha: DEFAULT_TIKHONOV_ALPHA,
            })?;
            Some(DEFAULT_TIKHONOV_ALPHA)
        }
        // The first nonzero entry of the nonincreasing masked spectrum is its maximum.
        Some(Tikhonov::Beta(beta)) => Some(beta * reference),
    };

    let mut keep: Vec<bool> = masked
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            x != 0.0
                && x / reference >= config.min_ratio
                && !(config.keep_largest > 0 && i >= config.keep_largest)
                && !(config.drop_smallest > 0 && i + config.drop_smallest >= k)
        })
        .collect();

    let mut deleted_indices: Vec<usize> = config.delete_indices.iter().copied().filter(|&i| i < k).collect();
    deleted_indices.sort_unstable();
    deleted_indices.dedup();
    for &i in &deleted_indices {
        keep[i] = false;
    }

    let mut inverse = Array1::zeros(k);
    let mut used = Array1::zeros(k);
    let mut max_used = f64::NEG_INFINITY;
    let mut min_used = f64::INFINITY;
    let mut retained = 0usize;
    for i in (0..k).filter(|&i| keep[i]) {
        let sigma = masked[i];
        inverse[i] = match tikhonov_alpha {
            Some(alpha) => sigma / (sigma * sigma + alpha * alpha),
            None => 1.0 / sigma,
        };
        used[i] = sigma;
        max_used = max_used.max(sigma);
        min_used = min_used.min(sigma);
        retained += 1;
    }

    if retained == 0 {
        return Err(PinvError::DegenerateMatrix(
            "regularization suppressed every singular value".to_string(),
        ));
    }

    let diagnostics = RegularizationDiagnostics {
        retained,
        condition_number: max_used / min_used,
        deleted_indices,
        dc_suppressed,
        tikhonov_alpha: tikhonov_alpha.unwrap_or(0.0),
        reference_singular_value: reference,
    };
    trace!("singular values used: {:?}", used);
    debug!(
        "retained {} of {} singular values, condition number {:.6e}",
        diagnostics.retained, k, diagnostics.condition_number
    );
    Ok(RegularizedSpectrum { inverse, used, diagnostics })
}
