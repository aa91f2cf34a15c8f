// src/schema.rs
//
// Dataset-boundary contracts: pages in, matrices out, and back again.

use crate::config::{LayoutOptions, SingularValueLayout};
use crate::dataset::{Column, ColumnData, Page};
use crate::error::{PinvError, SchemaError};
use crate::regularization::{RegularizationConfig, RegularizationDiagnostics, Tikhonov};
use crate::scalar::PinvScalar;
use ndarray::{Array2, ArrayView1, ArrayView2, ShapeBuilder};

/// Label column of the left-singular output when the input has no row-name column.
pub const ORIGINAL_ROWS: &str = "OriginalRows";
const REAL_PREFIX: &str = "Real";
const IMAG_PREFIX: &str = "Imag";

/// A matrix read from a page, with its row and column names.
#[derive(Debug, Clone)]
pub struct PageMatrix<F> {
    pub row_names: Vec<String>,
    /// Matrix column names; the `<x>` stems of `Real<x>`/`Imag<x>` in complex mode.
    pub column_names: Vec<String>,
    pub matrix: Array2<F>,
    /// String column the row names came from, if any.
    pub row_label_column: Option<String>,
}

/// `<root><i>` with `i` zero-padded to `max(digits, floor(log10(count)) + 1)`.
pub fn generated_names(root: &str, digits: usize, count: usize) -> Vec<String> {
    let width = if count > 0 {
        digits.max((count as f64).log10().floor() as usize + 1)
    } else {
        digits
    };
    (0..count).map(|i| format!("{}{:0width$}", root, i, width = width)).collect()
}

/// `SV000`, `SV001`, ... for singular-vector columns.
pub fn singular_vector_names(digits: usize, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("SV{:0width$}", i, width = digits)).collect()
}

fn text_column<'a>(page: &'a Page, name: &str) -> Result<&'a [String], SchemaError> {
    let column = page.column(name).ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
    column.data.as_text().ok_or_else(|| SchemaError::WrongColumnType {
        column: name.to_string(),
        expected: "string",
    })
}

fn numeric_column(page: &Page, name: &str) -> Result<Vec<f64>, SchemaError> {
    let column = page.column(name).ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
    column.data.to_f64().ok_or_else(|| SchemaError::WrongColumnType {
        column: name.to_string(),
        expected: "numeric",
    })
}

/// Names of the matrix columns (stems in complex mode), in page order.
fn matrix_column_names<F: PinvScalar>(page: &Page) -> Result<Vec<String>, SchemaError> {
    let numeric = page.columns().iter().filter(|c| c.data.is_numeric());
    if !F::IS_COMPLEX {
        let names: Vec<String> = numeric.map(|c| c.name.clone()).collect();
        if names.is_empty() {
            return Err(SchemaError::NoMatrixColumns);
        }
        return Ok(names);
    }

    let mut stems = Vec::new();
    for column in numeric {
        if let Some(stem) = column.name.strip_prefix(REAL_PREFIX) {
            let imag = format!("{}{}", IMAG_PREFIX, stem);
            if page.column(&imag).is_none() {
                return Err(SchemaError::ComplexPairMismatch(stem.to_string()));
            }
            stems.push(stem.to_string());
        } else if let Some(stem) = column.name.strip_prefix(IMAG_PREFIX) {
            if page.column(&format!("{}{}", REAL_PREFIX, stem)).is_none() {
                return Err(SchemaError::ComplexPairMismatch(stem.to_string()));
            }
        }
    }
    if stems.is_empty() {
        return Err(SchemaError::NoMatrixColumns);
    }
    Ok(stems)
}

/// Reads the matrix of a page.
///
/// Real mode uses every numeric column; complex mode uses the
/// `Real<x>`/`Imag<x>` pairs. Row names come from
/// `layout.row_names_column`, else the first string column, else are
/// generated. With `strict_row_names` a configured row-name column must
/// exist; otherwise a missing one falls back to the default rules.
///
/// # Errors
/// `EmptyPage` when the page has no rows; `Schema` errors for missing,
/// non-numeric or unpaired columns.
pub fn read_matrix_page<F: PinvScalar>(
    page: &Page,
    layout: &LayoutOptions,
    strict_row_names: bool,
) -> Result<PageMatrix<F>, PinvError> {
    let rows = page.row_count();
    if rows == 0 {
        return Err(PinvError::EmptyPage);
    }
    let column_names = matrix_column_names::<F>(page)?;

    let mut matrix = Array2::<F>::zeros((rows, column_names.len()).f());
    for (j, name) in column_names.iter().enumerate() {
        let mut target = matrix.column_mut(j);
        if F::IS_COMPLEX {
            let re = numeric_column(page, &format!("{}{}", REAL_PREFIX, name))?;
            let im = numeric_column(page, &format!("{}{}", IMAG_PREFIX, name))?;
            for ((slot, &r), &i) in target.iter_mut().zip(re.iter()).zip(im.iter()) {
                *slot = F::from_parts(r, i);
            }
        } else {
            let values = numeric_column(page, name)?;
            for (slot, &r) in target.iter_mut().zip(values.iter()) {
                *slot = F::from_parts(r, 0.0);
            }
        }
    }

    let configured = layout
        .row_names_column
        .as_deref()
        .filter(|name| strict_row_names || page.column(name).is_some());
    let label = match configured {
        Some(name) => Some(name.to_string()),
        None => page
            .columns()
            .iter()
            .find(|c| !c.data.is_numeric())
            .map(|c| c.name.clone()),
    };
    let row_names = match &label {
        Some(name) => text_column(page, name)?.to_vec(),
        None => generated_names(layout.name_root(), layout.digits, rows),
    };

    Ok(PageMatrix { row_names, column_names, matrix, row_label_column: label })
}

/// Appends one column per matrix column: numeric in real mode,
/// `Real<x>`/`Imag<x>` pairs in complex mode.
pub fn write_matrix_columns<F: PinvScalar>(
    page: &mut Page,
    names: &[String],
    matrix: ArrayView2<'_, F>,
) -> Result<(), PinvError> {
    if names.len() != matrix.ncols() {
        return Err(PinvError::ShapeMismatch(format!(
            "{} column names for {} matrix columns",
            names.len(),
            matrix.ncols()
        )));
    }
    for (name, column) in names.iter().zip(matrix.columns()) {
        if F::IS_COMPLEX {
            let (re, im): (Vec<f64>, Vec<f64>) = column.iter().map(|x| x.parts()).unzip();
            page.push_column(Column::new(format!("{}{}", REAL_PREFIX, name), ColumnData::Double(re)))?;
            page.push_column(Column::new(format!("{}{}", IMAG_PREFIX, name), ColumnData::Double(im)))?;
        } else {
            let values = column.iter().map(|x| x.re()).collect();
            page.push_column(Column::new(name.clone(), ColumnData::Double(values)))?;
        }
    }
    Ok(())
}

/// Overwrites the matrix columns of a copy of `page` with `matrix`.
fn overwrite_matrix_columns<F: PinvScalar>(
    page: &mut Page,
    names: &[String],
    matrix: ArrayView2<'_, F>,
) -> Result<(), PinvError> {
    for (name, column) in names.iter().zip(matrix.columns()) {
        if F::IS_COMPLEX {
            let (re, im): (Vec<f64>, Vec<f64>) = column.iter().map(|x| x.parts()).unzip();
            page.replace_column_data(&format!("{}{}", REAL_PREFIX, name), ColumnData::Double(re))?;
            page.replace_column_data(&format!("{}{}", IMAG_PREFIX, name), ColumnData::Double(im))?;
        } else {
            let values = column.iter().map(|x| x.re()).collect();
            page.replace_column_data(name, ColumnData::Double(values))?;
        }
    }
    Ok(())
}

/// Per-page values stored as parameters and arrays of the primary output.
#[derive(Debug, Clone, Copy)]
pub struct PrimarySummary<'a> {
    pub config: &'a RegularizationConfig,
    pub diagnostics: &'a RegularizationDiagnostics,
    pub singular_values: ArrayView1<'a, f64>,
    pub used: ArrayView1<'a, f64>,
    pub inverse: ArrayView1<'a, f64>,
    pub input_file: &'a str,
}

/// Builds a primary output page: the label column followed by the matrix columns.
pub fn primary_page<F: PinvScalar>(
    label_column: &str,
    row_labels: &[String],
    column_names: &[String],
    matrix: ArrayView2<'_, F>,
    summary: &PrimarySummary<'_>,
) -> Result<Page, PinvError> {
    if row_labels.len() != matrix.nrows() {
        return Err(PinvError::ShapeMismatch(format!(
            "{} row labels for {} output rows",
            row_labels.len(),
            matrix.nrows()
        )));
    }
    let mut page = Page::new().with_column(label_column, ColumnData::Text(row_labels.to_vec()))?;
    write_matrix_columns(&mut page, column_names, matrix)?;

    let diagnostics = summary.diagnostics;
    page.set_parameter("MinimumSingularValueRatio", summary.config.min_ratio);
    page.set_parameter("NumberOfSingularValuesUsed", diagnostics.retained);
    page.set_parameter("DeletedVectors", diagnostics.deleted_vectors_label());
    page.set_parameter("ConditionNumber", diagnostics.condition_number);
    page.set_parameter("InputFile", summary.input_file);
    if !F::IS_COMPLEX {
        let (svn, beta) = match summary.config.tikhonov {
            Some(Tikhonov::SingularValueIndex(p)) => (p, 0.0),
            Some(Tikhonov::Beta(b)) => (0, b),
            _ => (0, 0.0),
        };
        page.set_parameter("TikhonovFilterUsed", i64::from(summary.config.tikhonov.is_some()));
        page.set_parameter("TikhonovSVNNumber", svn);
        page.set_parameter("TikhonovAlpha", diagnostics.tikhonov_alpha);
        page.set_parameter("TikhonovBeta", beta);
    }
    page.set_array("SingularValues", summary.singular_values.to_vec());
    page.set_array("SingularValuesUsed", summary.used.to_vec());
    page.set_array("InverseSingularValues", summary.inverse.to_vec());
    Ok(page)
}

/// Singular values as a table (`Index`, `SingularValues`) or as a diagonal matrix.
pub fn singular_value_page(
    singular_values: ArrayView1<'_, f64>,
    layout: SingularValueLayout,
    digits: usize,
) -> Result<Page, PinvError> {
    let k = singular_values.len();
    match layout {
        SingularValueLayout::Table => Ok(Page::new()
            .with_column("Index", ColumnData::Integer((0..k as i64).collect()))?
            .with_column("SingularValues", ColumnData::Double(singular_values.to_vec()))?),
        SingularValueLayout::Matrix => {
            let diagonal = Array2::from_diag(&singular_values.to_owned());
            let mut page = Page::new();
            write_matrix_columns(&mut page, &singular_vector_names(digits, k), diagonal.view())?;
            Ok(page)
        }
    }
}

/// Singular vectors, one `SV<i>` column each, preceded by a label column.
pub fn singular_vector_page<F: PinvScalar>(
    label_column: &str,
    labels: &[String],
    vectors: ArrayView2<'_, F>,
    digits: usize,
) -> Result<Page, PinvError> {
    let mut page = Page::new().with_column(label_column, ColumnData::Text(labels.to_vec()))?;
    write_matrix_columns(&mut page, &singular_vector_names(digits, vectors.ncols()), vectors)?;
    Ok(page)
}

/// Copy of the input page with the matrix columns replaced by `reconstruction`.
pub fn reconstruction_page<F: PinvScalar>(
    input: &Page,
    column_names: &[String],
    reconstruction: ArrayView2<'_, F>,
    diagnostics: &RegularizationDiagnostics,
) -> Result<Page, PinvError> {
    if reconstruction.dim() != (input.row_count(), column_names.len()) {
        return Err(PinvError::ShapeMismatch(format!(
            "reconstruction {:?} does not fit a {}-row page with {} matrix columns",
            reconstruction.dim(),
            input.row_count(),
            column_names.len()
        )));
    }
    let mut page = input.clone();
    overwrite_matrix_columns(&mut page, column_names, reconstruction)?;
    page.set_parameter("NumberOfSingularValuesUsed", diagnostics.retained);
    page.set_parameter("DeletedVectors", diagnostics.deleted_vectors_label());
    Ok(page)
}
