// Regularized Moore-Penrose pseudo-inverse

#![doc = include_str!("../README.md")]

pub mod assembly;
pub mod companion;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod linalg_backends;
pub mod matrix_buffer;
pub mod regularization;
pub mod scalar;
pub mod schema;
pub mod weighting;


pub use companion::MultiplyMode;
pub use config::{LayoutOptions, OutputOptions, PseudoInverseConfig, SingularValueLayout};
pub use dataset::{Column, ColumnData, Dataset, Page, ParameterValue};
pub use engine::{
    ComplexPseudoInverseEngine, PageReport, PageSolution, PseudoInverseEngine, RealPseudoInverseEngine,
    SessionOutputs, SessionReport,
};
pub use error::{EngineWarning, PageFailure, PageStage, PinvError, SchemaError, WarningPolicy};
pub use linalg_backends::{
    blas_threads, set_blas_threads, BackendSVD, LinAlgBackendProvider, NdarrayLinAlgBackend, ThinSvd,
};
#[cfg(feature = "backend_faer")]
pub use linalg_backends::FaerLinAlgBackend;
pub use regularization::{RegularizationConfig, RegularizationDiagnostics, Tikhonov};
pub use scalar::{c64, PinvScalar};
pub use weighting::{WeightSource, Weights};
