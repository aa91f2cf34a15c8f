// src/engine.rs

use crate::assembly::{assemble_inverse, reconstruct};
use crate::companion::{multiply, select_companion_page, CompanionPage, MultiplyMode};
use crate::config::PseudoInverseConfig;
use crate::dataset::{Dataset, Page};
use crate::error::{EngineWarning, PageFailure, PageStage, PinvError, WarningSink};
use crate::linalg_backends::{set_blas_threads, BackendSVD, LinAlgBackendProvider, ThinSvd};
use crate::matrix_buffer::MatrixBuffer;
use crate::regularization::{regularize, RegularizationDiagnostics, RegularizedSpectrum};
use crate::scalar::{c64, PinvScalar};
use crate::schema::{
    primary_page, read_matrix_page, reconstruction_page, singular_value_page, singular_vector_page, PageMatrix,
    PrimarySummary, ORIGINAL_ROWS,
};
use crate::weighting::{WeightSource, Weights};
use log::{debug, error, info, trace, warn};
use ndarray::{Array1, ArrayView1, ArrayView2};
use std::time::{Duration, Instant};

pub type RealPseudoInverseEngine = PseudoInverseEngine<f64>;
pub type ComplexPseudoInverseEngine = PseudoInverseEngine<c64>;

/// Results of one page, borrowed from the engine's reusable buffers.
#[derive(Debug, Clone, Copy)]
pub struct PageSolution<'a, F> {
    /// A+ (n×m), already rescaled for weights.
    pub inverse: ArrayView2<'a, F>,
    /// A+·B or B·A+ when a multiply mode is active.
    pub product: Option<ArrayView2<'a, F>>,
    /// U diag(s_used) V* (m×n) of the factored system, weights included,
    /// when reconstruction is enabled.
    pub reconstruction: Option<ArrayView2<'a, F>>,
    pub u: ArrayView2<'a, F>,
    pub v: ArrayView2<'a, F>,
    pub singular_values: ArrayView1<'a, f64>,
    pub used: ArrayView1<'a, f64>,
    pub inverse_singular_values: ArrayView1<'a, f64>,
    pub diagnostics: &'a RegularizationDiagnostics,
}

impl<'a, F> PageSolution<'a, F> {
    /// The matrix sent to the primary output: the product if present, else A+.
    pub fn primary(&self) -> ArrayView2<'a, F> {
        self.product.unwrap_or(self.inverse)
    }
}

/// Summary of a processed page.
#[derive(Debug, Clone)]
pub struct PageReport {
    pub page: usize,
    pub rows: usize,
    pub cols: usize,
    pub diagnostics: RegularizationDiagnostics,
    pub elapsed: Duration,
}

/// What happened during a session, besides the output pages.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub pages: Vec<PageReport>,
    pub failures: Vec<PageFailure>,
    pub warnings: Vec<EngineWarning>,
    /// Set when the companion dataset ran out and processing stopped.
    pub stopped_early: bool,
}

/// Output datasets of a session. Auxiliary datasets exist only when enabled.
#[derive(Debug, Default)]
pub struct SessionOutputs {
    pub primary: Dataset,
    pub singular_values: Option<Dataset>,
    pub left_singular_vectors: Option<Dataset>,
    pub right_singular_vectors: Option<Dataset>,
    pub reconstruction: Option<Dataset>,
    pub report: SessionReport,
}

/// Per-page buffers, reused while shapes repeat.
#[derive(Debug)]
struct Workspace<F: PinvScalar> {
    scratch: MatrixBuffer<F>,
    inverse: MatrixBuffer<F>,
    product: MatrixBuffer<F>,
    reconstruction: MatrixBuffer<F>,
    factors: ThinSvd<F>,
    spectrum: RegularizedSpectrum,
    has_product: bool,
    has_reconstruction: bool,
}

impl<F: PinvScalar> Default for Workspace<F> {
    fn default() -> Self {
        Self {
            scratch: MatrixBuffer::empty(),
            inverse: MatrixBuffer::empty(),
            product: MatrixBuffer::empty(),
            reconstruction: MatrixBuffer::empty(),
            factors: ThinSvd::empty(0, 0),
            spectrum: RegularizedSpectrum::default(),
            has_product: false,
            has_reconstruction: false,
        }
    }
}

fn at(stage: PageStage) -> impl Fn(PinvError) -> (PageStage, PinvError) {
    move |error| (stage, error)
}

impl<F: PinvScalar> Workspace<F> {
    /// Runs WeightApply through Reconstruct for one matrix.
    fn process<B: BackendSVD<F>>(
        &mut self,
        backend: &B,
        config: &PseudoInverseConfig,
        weights: &Weights,
        warnings: &mut WarningSink,
        a: ArrayView2<'_, F>,
        companion: Option<ArrayView2<'_, F>>,
    ) -> Result<(), (PageStage, PinvError)> {
        let (m, n) = a.dim();
        if m == 0 {
            return Err((PageStage::Read, PinvError::EmptyPage));
        }
        self.has_product = false;
        self.has_reconstruction = false;

        let mut system = MatrixBuffer::allocate(m, n).map_err(at(PageStage::WeightApply))?;
        system.view_mut().assign(&a);
        weights.apply_to_system(system.view_mut()).map_err(at(PageStage::WeightApply))?;

        let factor_start = Instant::now();
        self.factors = backend
            .svd_thin(system.take())
            .map_err(|e| (PageStage::Factor, PinvError::NonConvergent(e.to_string())))?;
        debug!("Thin SVD of {}x{} matrix in {:?}", m, n, factor_start.elapsed());
        trace!("singular values: {:?}", self.factors.s);

        self.spectrum = regularize(
            self.factors.s.view(),
            self.factors.v.view(),
            &config.regularization,
            warnings,
        )
        .map_err(at(PageStage::Regularize))?;

        assemble_inverse(
            self.factors.u.view(),
            self.spectrum.inverse.view(),
            self.factors.v.view(),
            &mut self.scratch,
            &mut self.inverse,
        )
        .map_err(at(PageStage::Assemble))?;
        weights
            .rescale_inverse(self.inverse.view_mut())
            .map_err(at(PageStage::Assemble))?;

        match (config.multiply, companion) {
            (MultiplyMode::None, _) => {}
            (mode, Some(b)) => {
                multiply(mode, self.inverse.view(), b, &mut self.product).map_err(at(PageStage::Multiply))?;
                self.has_product = true;
            }
            (mode, None) => {
                return Err((
                    PageStage::Multiply,
                    PinvError::ConfigConflict(format!("multiply mode {:?} needs a companion matrix", mode)),
                ));
            }
        }

        if config.outputs.reconstruct {
            reconstruct(
                self.factors.u.view(),
                self.spectrum.used.view(),
                self.factors.v.view(),
                &mut self.scratch,
                &mut self.reconstruction,
            )
            .map_err(at(PageStage::Reconstruct))?;
            self.has_reconstruction = true;
        }
        Ok(())
    }

    fn solution(&self) -> PageSolution<'_, F> {
        PageSolution {
            inverse: self.inverse.view(),
            product: self.has_product.then(|| self.product.view()),
            reconstruction: self.has_reconstruction.then(|| self.reconstruction.view()),
            u: self.factors.u.view(),
            v: self.factors.v.view(),
            singular_values: self.factors.s.view(),
            used: self.spectrum.used.view(),
            inverse_singular_values: self.spectrum.inverse.view(),
            diagnostics: &self.spectrum.diagnostics,
        }
    }
}

/// Regularized pseudo-inverse engine.
///
/// Real (`f64`) and complex (`c64`) variants share one implementation. The
/// factorization goes through `B`, by default the crate's backend provider.
#[derive(Debug)]
pub struct PseudoInverseEngine<F: PinvScalar, B = LinAlgBackendProvider<F>> {
    config: PseudoInverseConfig,
    backend: B,
    explicit_weights: Weights,
    row_weight_source: Option<WeightSource>,
    column_weight_source: Option<WeightSource>,
    /// Weights in effect for the current session, resolved on its first page.
    session_weights: Option<Weights>,
    warnings: WarningSink,
    workspace: Workspace<F>,
}

impl<F: PinvScalar> PseudoInverseEngine<F, LinAlgBackendProvider<F>>
where
    LinAlgBackendProvider<F>: BackendSVD<F>,
{
    /// Creates an engine with the default backend.
    ///
    /// # Errors
    /// `ConfigConflict` if the configuration is inconsistent.
    pub fn new(config: PseudoInverseConfig) -> Result<Self, PinvError> {
        Self::with_backend(config, LinAlgBackendProvider::new())
    }
}

impl<F: PinvScalar, B: BackendSVD<F> + Send> PseudoInverseEngine<F, B> {
    pub fn with_backend(config: PseudoInverseConfig, backend: B) -> Result<Self, PinvError> {
        config.validate()?;
        let warnings = WarningSink::new(config.warnings);
        Ok(Self {
            config,
            backend,
            explicit_weights: Weights::default(),
            row_weight_source: None,
            column_weight_source: None,
            session_weights: None,
            warnings,
            workspace: Workspace::default(),
        })
    }

    pub fn config(&self) -> &PseudoInverseConfig {
        &self.config
    }

    /// Fixed row weights `w_r` (one per row of A).
    pub fn with_row_weights(mut self, weights: Array1<f64>) -> Self {
        self.explicit_weights.row = Some(weights);
        self
    }

    /// Fixed column weights `w_c` (one per column of A).
    pub fn with_column_weights(mut self, weights: Array1<f64>) -> Self {
        self.explicit_weights.column = Some(weights);
        self
    }

    /// Row weights looked up by row name on the first page of a session.
    /// Takes precedence over fixed row weights in [`run`](Self::run).
    pub fn with_row_weight_source(mut self, source: WeightSource) -> Self {
        self.row_weight_source = Some(source);
        self
    }

    /// Column weights looked up by column name on the first page of a session.
    pub fn with_column_weight_source(mut self, source: WeightSource) -> Self {
        self.column_weight_source = Some(source);
        self
    }

    /// Warnings recorded since the last session, e.g. by [`solve`](Self::solve).
    pub fn take_warnings(&mut self) -> Vec<EngineWarning> {
        self.warnings.take_recorded()
    }

    /// Pseudo-inverse of one matrix with the fixed weights.
    ///
    /// `companion` is required when the configured multiply mode is not
    /// `None`. The results borrow the engine's buffers and are overwritten
    /// by the next call.
    pub fn solve(
        &mut self,
        a: ArrayView2<'_, F>,
        companion: Option<ArrayView2<'_, F>>,
    ) -> Result<PageSolution<'_, F>, PinvError> {
        self.workspace
            .process(&self.backend, &self.config, &self.explicit_weights, &mut self.warnings, a, companion)
            .map_err(|(_, error)| error)?;
        Ok(self.workspace.solution())
    }

    /// Processes every page of `input` in order.
    ///
    /// Page-local failures are recorded in the report and the page is left
    /// out of the outputs. Configuration conflicts, schema errors on the
    /// first page, allocation failures and escalated warnings end the
    /// session with `Err`.
    pub fn run(&mut self, input: &Dataset, companion: Option<&Dataset>) -> Result<SessionOutputs, PinvError> {
        if self.config.multiply.needs_companion() && companion.is_none() {
            return Err(PinvError::ConfigConflict(format!(
                "multiply mode {:?} needs a companion dataset",
                self.config.multiply
            )));
        }
        if self.config.threads == 0 {
            return self.run_pages(input, companion);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| PinvError::ConfigConflict(format!("cannot build a {}-thread pool: {}", self.config.threads, e)))?;
        let previous_blas_threads = set_blas_threads(self.config.threads);
        debug!(
            "Running kernels on a dedicated pool of {} threads (BLAS threads before: {:?})",
            self.config.threads, previous_blas_threads
        );
        let result = pool.install(|| self.run_pages(input, companion));
        if let Some(threads) = previous_blas_threads {
            set_blas_threads(threads);
        }
        result
    }

    fn run_pages(&mut self, input: &Dataset, companion: Option<&Dataset>) -> Result<SessionOutputs, PinvError> {
        let session_start = Instant::now();
        info!(
            "Starting pseudo-inverse session: {} input pages, multiply mode {:?}",
            input.page_count(),
            self.config.multiply
        );
        if companion.is_some() && !self.config.multiply.needs_companion() {
            debug!("Companion dataset given without a multiply mode; ignoring it");
        }

        let outputs_config = &self.config.outputs;
        let mut outputs = SessionOutputs {
            singular_values: outputs_config.emit_s.map(|_| Dataset::new()),
            left_singular_vectors: outputs_config.emit_u.then(Dataset::new),
            right_singular_vectors: outputs_config.emit_v.then(Dataset::new),
            reconstruction: outputs_config.reconstruct.then(Dataset::new),
            ..Default::default()
        };
        self.session_weights = None;
        let mut first_row_count: Option<usize> = None;

        for (index, page) in input.pages().iter().enumerate() {
            let companion_page = match companion.filter(|_| self.config.multiply.needs_companion()) {
                None => None,
                Some(dataset) => {
                    let available = dataset.page_count();
                    match select_companion_page(index, available, self.config.reuse_last_companion_page) {
                        CompanionPage::Matching(i) => dataset.page(i),
                        CompanionPage::ReusedLast(i) => {
                            self.warnings.emit(EngineWarning::ReusedCompanionPage { page: index })?;
                            dataset.page(i)
                        }
                        CompanionPage::Exhausted => {
                            self.warnings.emit(EngineWarning::PageCountMismatch {
                                page: index,
                                companion_pages: available,
                            })?;
                            outputs.report.stopped_early = true;
                            break;
                        }
                    }
                }
            };

            let page_start = Instant::now();
            match self.process_page(index, page, companion_page, input, &mut first_row_count, &mut outputs) {
                Ok((rows, cols)) => {
                    let elapsed = page_start.elapsed();
                    let diagnostics = self.workspace.spectrum.diagnostics.clone();
                    info!(
                        "Page {}: {}x{} matrix, {} singular values used, condition number {:.6e}, in {:?}",
                        index, rows, cols, diagnostics.retained, diagnostics.condition_number, elapsed
                    );
                    outputs.report.pages.push(PageReport { page: index, rows, cols, diagnostics, elapsed });
                }
                Err((stage, error)) => {
                    // Schema errors on the first page or in the weight datasets end the session.
                    let fatal_schema = matches!(error, PinvError::Schema(_))
                        && (index == 0 || stage == PageStage::WeightApply);
                    if !error.is_page_local() || fatal_schema {
                        error!("page {} [{}]: {}", index, stage, error);
                        return Err(error);
                    }
                    let failure = PageFailure { page: index, stage, error };
                    if failure.error.is_recoverable() {
                        warn!("{}; page skipped", failure);
                    } else {
                        error!("{}", failure);
                    }
                    outputs.report.failures.push(failure);
                }
            }
        }

        outputs.report.warnings = self.warnings.take_recorded();
        info!(
            "Finished pseudo-inverse session: {} pages written, {} failed, in {:?}",
            outputs.report.pages.len(),
            outputs.report.failures.len(),
            session_start.elapsed()
        );
        Ok(outputs)
    }

    /// Resolves dataset-backed weights against the first page's names.
    fn resolve_session_weights(&mut self, a: &PageMatrix<F>) -> Result<(), PinvError> {
        if self.session_weights.is_some() {
            return Ok(());
        }
        let mut weights = self.explicit_weights.clone();
        if let Some(source) = &self.row_weight_source {
            let table = source.table(&mut self.warnings)?;
            weights.row = Some(table.resolve(&a.row_names, &mut self.warnings)?);
        }
        if let Some(source) = &self.column_weight_source {
            let table = source.table(&mut self.warnings)?;
            weights.column = Some(table.resolve(&a.column_names, &mut self.warnings)?);
        }
        if !weights.is_empty() {
            debug!(
                "Session weights: {} row weights, {} column weights",
                weights.row.as_ref().map_or(0, |w| w.len()),
                weights.column.as_ref().map_or(0, |w| w.len())
            );
        }
        self.session_weights = Some(weights);
        Ok(())
    }

    /// Read, solve and emit one page. Output pages are only added once all
    /// of them have been built.
    fn process_page(
        &mut self,
        index: usize,
        page: &Page,
        companion_page: Option<&Page>,
        input: &Dataset,
        first_row_count: &mut Option<usize>,
        outputs: &mut SessionOutputs,
    ) -> Result<(usize, usize), (PageStage, PinvError)> {
        let layout = &self.config.layout;
        let a: PageMatrix<F> = read_matrix_page(page, layout, true).map_err(at(PageStage::Read))?;
        let b: Option<PageMatrix<F>> = companion_page
            .map(|p| read_matrix_page(p, layout, false))
            .transpose()
            .map_err(at(PageStage::Read))?;
        let (rows, cols) = a.matrix.dim();
        debug!("Page {}: read {}x{} matrix", index, rows, cols);

        match *first_row_count {
            Some(expected) if self.config.require_constant_row_count && expected != rows => {
                return Err((
                    PageStage::WeightApply,
                    PinvError::ShapeMismatch(format!("page has {} rows, the first page had {}", rows, expected)),
                ));
            }
            Some(_) => {}
            None => *first_row_count = Some(rows),
        }
        self.resolve_session_weights(&a).map_err(at(PageStage::WeightApply))?;

        let weights = self.session_weights.as_ref().unwrap_or(&self.explicit_weights);
        self.workspace
            .process(
                &self.backend,
                &self.config,
                weights,
                &mut self.warnings,
                a.matrix.view(),
                b.as_ref().map(|b| b.matrix.view()),
            )?;

        let solution = self.workspace.solution();
        let config = &self.config;
        let layout = &config.layout;
        let input_file = input.source.as_deref().unwrap_or("");
        let summary = PrimarySummary {
            config: &config.regularization,
            diagnostics: solution.diagnostics,
            singular_values: solution.singular_values,
            used: solution.used,
            inverse: solution.inverse_singular_values,
            input_file,
        };
        let emit = at(PageStage::Emit);

        let (row_labels, column_names) = match (config.multiply, &b) {
            (MultiplyMode::Post, Some(b)) => (&a.column_names, &b.column_names),
            (MultiplyMode::Pre, Some(b)) => (&b.row_names, &a.row_names),
            _ => (&a.column_names, &a.row_names),
        };
        let primary = primary_page(&layout.old_column_names, row_labels, column_names, solution.primary(), &summary)
            .map_err(&emit)?;

        let s_page = config
            .outputs
            .emit_s
            .map(|layout_kind| singular_value_page(solution.singular_values, layout_kind, layout.singular_vector_digits))
            .transpose()
            .map_err(&emit)?;
        let u_page = config
            .outputs
            .emit_u
            .then(|| {
                let label = a.row_label_column.as_deref().unwrap_or(ORIGINAL_ROWS);
                singular_vector_page(label, &a.row_names, solution.u, layout.singular_vector_digits)
            })
            .transpose()
            .map_err(&emit)?;
        let v_page = config
            .outputs
            .emit_v
            .then(|| {
                singular_vector_page(&layout.old_column_names, &a.column_names, solution.v, layout.singular_vector_digits)
            })
            .transpose()
            .map_err(&emit)?;
        let reconstruction = match solution.reconstruction {
            Some(rec) => Some(reconstruction_page(page, &a.column_names, rec, solution.diagnostics).map_err(&emit)?),
            None => None,
        };

        outputs.primary.push_page(primary);
        if let (Some(dataset), Some(p)) = (outputs.singular_values.as_mut(), s_page) {
            dataset.push_page(p);
        }
        if let (Some(dataset), Some(p)) = (outputs.left_singular_vectors.as_mut(), u_page) {
            dataset.push_page(p);
        }
        if let (Some(dataset), Some(p)) = (outputs.right_singular_vectors.as_mut(), v_page) {
            dataset.push_page(p);
        }
        if let (Some(dataset), Some(p)) = (outputs.reconstruction.as_mut(), reconstruction) {
            dataset.push_page(p);
        }
        Ok((rows, cols))
    }
}
