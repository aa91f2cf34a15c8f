// src/dataset.rs

use crate::error::{PinvError, SchemaError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Typed storage of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Double(Vec<f64>),
    Integer(Vec<i64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Double(values) => values.len(),
            ColumnData::Integer(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ColumnData::Text(_))
    }

    /// Numeric values as `f64`; integers are cast. `None` for text columns.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            ColumnData::Double(values) => Some(values.clone()),
            ColumnData::Integer(values) => Some(values.iter().map(|&v| v as f64).collect()),
            ColumnData::Text(_) => None,
        }
    }

    /// Numeric value at `row` as `f64`.
    pub fn value_f64(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Double(values) => values.get(row).copied(),
            ColumnData::Integer(values) => values.get(row).map(|&v| v as f64),
            ColumnData::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            ColumnData::Text(values) => Some(values),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new<S: Into<String>>(name: S, data: ColumnData) -> Self {
        Self { name: name.into(), data }
    }
}

/// Value of a page parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Double(f64),
    Integer(i64),
    Text(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Double(v) => Some(*v),
            ParameterValue::Integer(v) => Some(*v as f64),
            ParameterValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Double(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Integer(v)
    }
}

impl From<usize> for ParameterValue {
    fn from(v: usize) -> Self {
        ParameterValue::Integer(v as i64)
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::Text(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Text(v.to_string())
    }
}

/// One block of rows sharing a parameter context.
///
/// All columns of a page have the same number of rows. Parameters and
/// arrays keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    columns: Vec<Column>,
    parameters: Vec<(String, ParameterValue)>,
    arrays: Vec<(String, Vec<f64>)>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Page::push_column`].
    pub fn with_column<S: Into<String>>(mut self, name: S, data: ColumnData) -> Result<Self, SchemaError> {
        self.push_column(Column::new(name, data))?;
        Ok(self)
    }

    /// Appends a column.
    ///
    /// # Errors
    /// `DuplicateColumn` if the name is taken, `RaggedColumn` if the length
    /// differs from the existing columns.
    pub fn push_column(&mut self, column: Column) -> Result<(), SchemaError> {
        if self.column(&column.name).is_some() {
            return Err(SchemaError::DuplicateColumn(column.name));
        }
        if let Some(first) = self.columns.first() {
            let expected = first.data.len();
            let found = column.data.len();
            if expected != found {
                return Err(SchemaError::RaggedColumn { column: column.name, expected, found });
            }
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replaces the data of an existing column, keeping its position.
    pub fn replace_column_data(&mut self, name: &str, data: ColumnData) -> Result<(), SchemaError> {
        let expected = self.row_count();
        let found = data.len();
        if expected != found {
            return Err(SchemaError::RaggedColumn { column: name.to_string(), expected, found });
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
        column.data = data;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Sets a parameter, replacing any previous value with the same name.
    pub fn set_parameter<S: Into<String>, V: Into<ParameterValue>>(&mut self, name: S, value: V) {
        let name = name.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((name, value)),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn parameters(&self) -> &[(String, ParameterValue)] {
        &self.parameters
    }

    pub fn set_array<S: Into<String>>(&mut self, name: S, values: Vec<f64>) {
        let name = name.into();
        match self.arrays.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = values,
            None => self.arrays.push((name, values)),
        }
    }

    pub fn array(&self, name: &str) -> Option<&[f64]> {
        self.arrays.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    pub fn arrays(&self) -> &[(String, Vec<f64>)] {
        &self.arrays
    }

    fn check_consistency(&self) -> Result<(), SchemaError> {
        let expected = self.row_count();
        for (i, column) in self.columns.iter().enumerate() {
            if column.data.len() != expected {
                return Err(SchemaError::RaggedColumn {
                    column: column.name.clone(),
                    expected,
                    found: column.data.len(),
                });
            }
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(())
    }
}

/// Multi-page tabular dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Where the data came from; copied to the `InputFile` parameter of outputs.
    pub source: Option<String>,
    pub description: Option<String>,
    pages: Vec<Page>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Saves the dataset to a file using bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PinvError> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| PinvError::Serialization(format!("Failed to serialize dataset: {}", e)))?;
        Ok(())
    }

    /// Loads a dataset previously written with [`Dataset::save`].
    ///
    /// # Errors
    /// Returns an error if file I/O or deserialization fails, or if a page
    /// holds ragged or duplicate columns.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PinvError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let dataset: Dataset = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| PinvError::Serialization(format!("Failed to deserialize dataset: {}", e)))?;
        for page in &dataset.pages {
            page.check_consistency()?;
        }
        Ok(dataset)
    }
}
