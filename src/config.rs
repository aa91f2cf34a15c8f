// src/config.rs

use crate::companion::MultiplyMode;
use crate::error::{PinvError, WarningPolicy};
use crate::regularization::RegularizationConfig;
use serde::{Deserialize, Serialize};

/// Root of generated row names when the input page has no name column.
pub const DEFAULT_NAME_ROOT: &str = "Column";
/// Label column of the primary and right-singular outputs.
pub const DEFAULT_OLD_COLUMN_NAMES: &str = "OldColumnNames";
pub const DEFAULT_DIGITS: usize = 3;

/// Layout of the singular-value output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingularValueLayout {
    /// `Index` and `SingularValues` columns, one row per value.
    Table,
    /// k×k matrix with the singular values on the diagonal.
    Matrix,
}

/// Auxiliary outputs produced per page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub reconstruct: bool,
    pub emit_u: bool,
    pub emit_v: bool,
    pub emit_s: Option<SingularValueLayout>,
}

/// Naming of rows and columns in the output pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutOptions {
    /// String column of the input holding the row names. When unset, the
    /// first string column is used, else names are generated.
    pub row_names_column: Option<String>,
    /// Root of generated row names (`Column` if unset).
    pub root: Option<String>,
    /// Minimum width of the index in generated names.
    pub digits: usize,
    /// Name of the label column in the primary output.
    pub old_column_names: String,
    /// Width of the index in `SV000`-style column names.
    pub singular_vector_digits: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            row_names_column: None,
            root: None,
            digits: DEFAULT_DIGITS,
            old_column_names: DEFAULT_OLD_COLUMN_NAMES.to_string(),
            singular_vector_digits: DEFAULT_DIGITS,
        }
    }
}

impl LayoutOptions {
    pub fn name_root(&self) -> &str {
        self.root.as_deref().unwrap_or(DEFAULT_NAME_ROOT)
    }
}

/// Configuration of a pseudo-inverse session. Built once and never mutated
/// by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PseudoInverseConfig {
    pub regularization: RegularizationConfig,
    pub multiply: MultiplyMode,
    pub outputs: OutputOptions,
    pub layout: LayoutOptions,
    pub warnings: WarningPolicy,
    /// Reuse the last companion page when the companion dataset runs out
    /// instead of stopping.
    pub reuse_last_companion_page: bool,
    /// Reject pages whose row count differs from the first page.
    pub require_constant_row_count: bool,
    /// Threads for the linear-algebra kernels during [`run`](crate::PseudoInverseEngine::run).
    /// A positive count builds a dedicated rayon pool for the backend (faer
    /// runs on it) and is set on OpenBLAS for the session. 0 keeps the global
    /// pool and the BLAS defaults.
    pub threads: usize,
}

impl PseudoInverseConfig {
    pub fn validate(&self) -> Result<(), PinvError> {
        self.regularization.validate()?;
        let layout = &self.layout;
        if layout.root.is_some() && layout.row_names_column.is_some() {
            return Err(PinvError::ConfigConflict(
                "root and row_names_column are incompatible".to_string(),
            ));
        }
        if layout.root.as_deref() == Some("") {
            return Err(PinvError::ConfigConflict("root must not be empty".to_string()));
        }
        if layout.digits == 0 || layout.singular_vector_digits == 0 {
            return Err(PinvError::ConfigConflict("digits must be positive".to_string()));
        }
        if layout.old_column_names.is_empty() {
            return Err(PinvError::ConfigConflict("old_column_names must not be empty".to_string()));
        }
        Ok(())
    }
}
