// src/error.rs

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors, used at the backend boundary.
pub type ThreadSafeStdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while reading a dataset page into a matrix, or a weight table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("column '{0}' does not exist")]
    MissingColumn(String),
    #[error("column '{column}' must be {expected}")]
    WrongColumnType { column: String, expected: &'static str },
    #[error("page has no numeric matrix columns")]
    NoMatrixColumns,
    #[error("complex column pair Real{0}/Imag{0} is incomplete")]
    ComplexPairMismatch(String),
    #[error("column '{column}' has {found} rows, expected {expected}")]
    RaggedColumn { column: String, expected: usize, found: usize },
    #[error("column '{0}' is defined twice")]
    DuplicateColumn(String),
    #[error("weight dataset '{0}' is malformed: {1}")]
    MalformedWeights(String, String),
}

/// Error taxonomy of the pseudo-inverse engine.
#[derive(Debug, Error)]
pub enum PinvError {
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("page has no rows")]
    EmptyPage,
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("singular value decomposition did not converge: {0}")]
    NonConvergent(String),
    #[error("degenerate matrix: {0}")]
    DegenerateMatrix(String),
    #[error("out of memory allocating a {rows}x{cols} matrix")]
    OutOfMemory { rows: usize, cols: usize },
    #[error("warning escalated to error: {0}")]
    EscalatedWarning(EngineWarning),
    #[error("array layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PinvError {
    /// Whether the error only terminates the current page.
    ///
    /// Configuration conflicts, allocation failures, escalated warnings and
    /// persistence errors terminate the whole session.
    pub fn is_page_local(&self) -> bool {
        matches!(
            self,
            PinvError::EmptyPage
                | PinvError::ShapeMismatch(_)
                | PinvError::NonConvergent(_)
                | PinvError::DegenerateMatrix(_)
                | PinvError::Schema(_)
        )
    }

    /// Whether the page can be skipped without reporting a failure of the pipeline.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PinvError::EmptyPage)
    }
}

/// Pipeline stage of a page, used to locate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageStage {
    Read,
    WeightApply,
    Factor,
    Regularize,
    Assemble,
    Multiply,
    Reconstruct,
    Emit,
}

impl fmt::Display for PageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageStage::Read => "read",
            PageStage::WeightApply => "weighting",
            PageStage::Factor => "svd",
            PageStage::Regularize => "regularization",
            PageStage::Assemble => "inverse assembly",
            PageStage::Multiply => "companion multiply",
            PageStage::Reconstruct => "reconstruction",
            PageStage::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// A page that was abandoned. The corresponding output page is absent.
#[derive(Debug)]
pub struct PageFailure {
    /// Zero-based index of the input page.
    pub page: usize,
    pub stage: PageStage,
    pub error: PinvError,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} [{}]: {}", self.page, self.stage, self.error)
    }
}

/// Nonfatal conditions reported on the diagnostic channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineWarning {
    #[error("no weight found for '{name}' in {source_name}; using 1")]
    UnmatchedWeightName { name: String, source_name: String },
    #[error("weight name '{name}' appears more than once in {source_name}; the last value is used")]
    DuplicateWeightName { name: String, source_name: String },
    #[error("weight {value} for '{name}' is not positive; the problem is ill-posed")]
    NonPositiveWeight { name: String, value: f64 },
    #[error("companion dataset has {companion_pages} pages but the input has more; stopping at page {page}")]
    PageCountMismatch { page: usize, companion_pages: usize },
    #[error("companion dataset exhausted; reusing its last page for input page {page}")]
    ReusedCompanionPage { page: usize },
    #[error("Tikhonov singular value number {requested} exceeds the {available} singular values; using alpha={fallback_alpha}")]
    TikhonovIndexOutOfRange { requested: usize, available: usize, fallback_alpha: f64 },
}

/// What happens to warnings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningPolicy {
    /// Log and record warnings.
    #[default]
    Report,
    /// Drop warnings silently.
    Silence,
    /// Turn the first warning into a fatal `EscalatedWarning` error.
    Escalate,
}

/// Leveled diagnostic sink for warnings.
#[derive(Debug, Default)]
pub struct WarningSink {
    policy: WarningPolicy,
    recorded: Vec<EngineWarning>,
}

impl WarningSink {
    pub fn new(policy: WarningPolicy) -> Self {
        Self { policy, recorded: Vec::new() }
    }

    /// Emits one warning according to the policy.
    pub fn emit(&mut self, warning: EngineWarning) -> Result<(), PinvError> {
        match self.policy {
            WarningPolicy::Silence => Ok(()),
            WarningPolicy::Report => {
                warn!("{}", warning);
                self.recorded.push(warning);
                Ok(())
            }
            WarningPolicy::Escalate => Err(PinvError::EscalatedWarning(warning)),
        }
    }

    pub fn recorded(&self) -> &[EngineWarning] {
        &self.recorded
    }

    pub fn take_recorded(&mut self) -> Vec<EngineWarning> {
        std::mem::take(&mut self.recorded)
    }
}
