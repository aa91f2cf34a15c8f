// src/weighting.rs

use crate::dataset::{Dataset, Page};
use crate::error::{EngineWarning, PinvError, SchemaError, WarningSink};
use crate::scalar::PinvScalar;
use log::debug;
use ndarray::{Array1, ArrayViewMut2};
use std::collections::HashMap;

/// Optional row weights `w_r` (length m) and column weights `w_c` (length n).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Weights {
    pub row: Option<Array1<f64>>,
    pub column: Option<Array1<f64>>,
}

impl Weights {
    pub fn new(row: Option<Array1<f64>>, column: Option<Array1<f64>>) -> Self {
        Self { row, column }
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_none() && self.column.is_none()
    }

    /// Checks that the weights fit an m×n system.
    pub fn check_dims(&self, nrows: usize, ncols: usize) -> Result<(), PinvError> {
        if let Some(w) = &self.row {
            if w.len() != nrows {
                return Err(PinvError::ShapeMismatch(format!(
                    "{} row weights for a matrix with {} rows",
                    w.len(),
                    nrows
                )));
            }
        }
        if let Some(w) = &self.column {
            if w.len() != ncols {
                return Err(PinvError::ShapeMismatch(format!(
                    "{} column weights for a matrix with {} columns",
                    w.len(),
                    ncols
                )));
            }
        }
        Ok(())
    }

    /// `A[i,j] <- w_r[i] * w_c[j] * A[i,j]`.
    pub fn apply_to_system<F: PinvScalar>(&self, mut a: ArrayViewMut2<'_, F>) -> Result<(), PinvError> {
        let (m, n) = a.dim();
        self.check_dims(m, n)?;
        if let Some(w_r) = &self.row {
            for (mut row, &w) in a.rows_mut().into_iter().zip(w_r.iter()) {
                row.mapv_inplace(|x| x.scale(w));
            }
        }
        if let Some(w_c) = &self.column {
            for (mut column, &w) in a.columns_mut().into_iter().zip(w_c.iter()) {
                column.mapv_inplace(|x| x.scale(w));
            }
        }
        Ok(())
    }

    /// Maps the pseudo-inverse of the weighted system (n×m) back to the
    /// caller's problem: column j is scaled by `w_r[j]`, row i by `w_c[i]`.
    pub fn rescale_inverse<F: PinvScalar>(&self, mut inverse: ArrayViewMut2<'_, F>) -> Result<(), PinvError> {
        let (n, m) = inverse.dim();
        self.check_dims(m, n)?;
        if let Some(w_r) = &self.row {
            for (mut column, &w) in inverse.columns_mut().into_iter().zip(w_r.iter()) {
                column.mapv_inplace(|x| x.scale(w));
            }
        }
        if let Some(w_c) = &self.column {
            for (mut row, &w) in inverse.rows_mut().into_iter().zip(w_c.iter()) {
                row.mapv_inplace(|x| x.scale(w));
            }
        }
        Ok(())
    }
}

/// A weight dataset and the names of its name and value columns.
#[derive(Debug, Clone)]
pub struct WeightSource {
    pub dataset: Dataset,
    pub name_column: String,
    pub value_column: String,
}

impl WeightSource {
    pub fn new<N: Into<String>, V: Into<String>>(dataset: Dataset, name_column: N, value_column: V) -> Self {
        Self { dataset, name_column: name_column.into(), value_column: value_column.into() }
    }

    fn source_name(&self) -> String {
        self.dataset.source.clone().unwrap_or_else(|| "weight dataset".to_string())
    }

    /// Reads the table from the first page of the dataset.
    pub fn table(&self, warnings: &mut WarningSink) -> Result<WeightTable, PinvError> {
        let source_name = self.source_name();
        let page = self.dataset.page(0).ok_or_else(|| {
            SchemaError::MalformedWeights(source_name.clone(), "dataset has no pages".to_string())
        })?;
        WeightTable::from_page(page, &self.name_column, &self.value_column, source_name, warnings)
    }
}

/// Name-to-weight lookup read from a weight page.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    source_name: String,
    weights: HashMap<String, f64>,
}

impl WeightTable {
    /// Builds the table from a page with a string name column and a numeric
    /// value column. Repeated names keep the last value.
    pub fn from_page(
        page: &Page,
        name_column: &str,
        value_column: &str,
        source_name: String,
        warnings: &mut WarningSink,
    ) -> Result<Self, PinvError> {
        let names = page
            .column(name_column)
            .ok_or_else(|| SchemaError::MissingColumn(name_column.to_string()))?;
        let names = names.data.as_text().ok_or_else(|| SchemaError::WrongColumnType {
            column: name_column.to_string(),
            expected: "string",
        })?;
        let values = page
            .column(value_column)
            .ok_or_else(|| SchemaError::MissingColumn(value_column.to_string()))?;
        let values = values.data.to_f64().ok_or_else(|| SchemaError::WrongColumnType {
            column: value_column.to_string(),
            expected: "numeric",
        })?;
        if names.is_empty() {
            return Err(SchemaError::MalformedWeights(source_name, "weight page has no rows".to_string()).into());
        }

        let mut weights = HashMap::with_capacity(names.len());
        for (name, &value) in names.iter().zip(values.iter()) {
            if weights.insert(name.clone(), value).is_some() {
                warnings.emit(EngineWarning::DuplicateWeightName {
                    name: name.clone(),
                    source_name: source_name.clone(),
                })?;
            }
        }
        debug!("read {} weights from {}", weights.len(), source_name);
        Ok(Self { source_name, weights })
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    /// One weight per name. Unmatched names get 1; nonpositive weights are
    /// kept. Both cases are reported as warnings.
    pub fn resolve(&self, names: &[String], warnings: &mut WarningSink) -> Result<Array1<f64>, PinvError> {
        let mut resolved = Array1::ones(names.len());
        for (slot, name) in resolved.iter_mut().zip(names.iter()) {
            match self.weights.get(name) {
                Some(&value) => {
                    if value <= 0.0 {
                        warnings.emit(EngineWarning::NonPositiveWeight { name: name.clone(), value })?;
                    }
                    *slot = value;
                }
                None => warnings.emit(EngineWarning::UnmatchedWeightName {
                    name: name.clone(),
                    source_name: self.source_name.clone(),
                })?,
            }
        }
        Ok(resolved)
    }
}
