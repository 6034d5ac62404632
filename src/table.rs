//! Column-major tabular values.
//!
//! `Frame` is the table handed to generated scripts (market panel + index
//! series) and returned by them (factor values). Columns are ordered and
//! typed; persistence is a columnar JSON document so factor outputs stay
//! inspectable. Non-finite floats serialize as `null` and come back as NaN.

use crate::errors::TableError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A single typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Column {
    Int(Vec<i64>),
    Float(
        #[serde(
            serialize_with = "serialize_floats",
            deserialize_with = "deserialize_floats"
        )]
        Vec<f64>,
    ),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type label used in contract diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Int(_) => "int",
            Column::Float(_) => "float",
            Column::Str(_) => "str",
        }
    }
}

fn serialize_floats<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(
        values
            .iter()
            .map(|v| if v.is_finite() { Some(*v) } else { None }),
    )
}

fn deserialize_floats<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// An ordered collection of equal-length named columns.
///
/// Serializes as a plain name-to-column map, so data files read naturally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    columns: IndexMap<String, Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows (length of the first column; 0 for a columnless frame).
    pub fn rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Insert or replace a column. Every column in a non-empty frame must
    /// have the same length.
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<(), TableError> {
        if !self.columns.is_empty() {
            // Replacing the only column may change the row count freely.
            let expected = self.rows();
            let replacing_sole_column = self.columns.len() == 1 && self.has_column(name);
            if !replacing_sole_column && column.len() != expected {
                return Err(TableError::LengthMismatch {
                    column: name.to_string(),
                    expected,
                    actual: column.len(),
                });
            }
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    /// Project to the named columns, in the order given.
    pub fn select(&self, names: &[&str]) -> Result<Frame, TableError> {
        let mut out = Frame::new();
        for &name in names {
            let column = self
                .column(name)
                .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;
            out.columns.insert(name.to_string(), column.clone());
        }
        Ok(out)
    }

    /// Persist as a columnar JSON document.
    pub fn write_json(&self, path: &Path) -> Result<(), TableError> {
        let body = serde_json::to_string(self).map_err(|source| TableError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, body).map_err(|source| TableError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a columnar JSON document.
    pub fn read_json(path: &Path) -> Result<Frame, TableError> {
        let body = fs::read_to_string(path).map_err(|source| TableError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|source| TableError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_frame() -> Frame {
        let mut frame = Frame::new();
        frame
            .set_column(
                "TradingDay",
                Column::Str(vec!["2024-01-02".into(), "2024-01-03".into()]),
            )
            .unwrap();
        frame
            .set_column("SecuCode", Column::Int(vec![1, 600000]))
            .unwrap();
        frame
            .set_column("ClosePrice", Column::Float(vec![10.5, 11.0]))
            .unwrap();
        frame
    }

    #[test]
    fn rows_and_names_reflect_insertion_order() {
        let frame = sample_frame();
        assert_eq!(frame.rows(), 2);
        assert_eq!(
            frame.column_names(),
            vec!["TradingDay", "SecuCode", "ClosePrice"]
        );
        assert!(frame.has_column("SecuCode"));
        assert!(!frame.has_column("OpenPrice"));
    }

    #[test]
    fn set_column_rejects_length_mismatch() {
        let mut frame = sample_frame();
        let err = frame
            .set_column("Alpha", Column::Float(vec![1.0]))
            .unwrap_err();
        match err {
            TableError::LengthMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("Expected LengthMismatch, got {other}"),
        }
    }

    #[test]
    fn set_column_replaces_existing_values() {
        let mut frame = sample_frame();
        frame
            .set_column("SecuCode", Column::Str(vec!["000001".into(), "600000".into()]))
            .unwrap();
        match frame.column("SecuCode") {
            Some(Column::Str(values)) => assert_eq!(values[0], "000001"),
            other => panic!("Expected Str column, got {other:?}"),
        }
        // Replacing keeps the column in place rather than appending.
        assert_eq!(
            frame.column_names(),
            vec!["TradingDay", "SecuCode", "ClosePrice"]
        );
    }

    #[test]
    fn select_projects_in_requested_order() {
        let frame = sample_frame();
        let projected = frame.select(&["SecuCode", "TradingDay"]).unwrap();
        assert_eq!(projected.column_names(), vec!["SecuCode", "TradingDay"]);
        assert_eq!(projected.rows(), 2);
    }

    #[test]
    fn select_missing_column_names_it() {
        let frame = sample_frame();
        let err = frame.select(&["SecuCode", "Nope"]).unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn json_roundtrip_preserves_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.json");
        let frame = sample_frame();
        frame.write_json(&path).unwrap();
        let loaded = Frame::read_json(&path).unwrap();
        assert_eq!(loaded, frame);
    }

    #[test]
    fn non_finite_floats_roundtrip_as_nan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.json");
        let mut frame = Frame::new();
        frame
            .set_column("Alpha", Column::Float(vec![1.0, f64::NAN, f64::INFINITY]))
            .unwrap();
        frame.write_json(&path).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("null"));

        let loaded = Frame::read_json(&path).unwrap();
        match loaded.column("Alpha") {
            Some(Column::Float(values)) => {
                assert_eq!(values[0], 1.0);
                assert!(values[1].is_nan());
                assert!(values[2].is_nan());
            }
            other => panic!("Expected Float column, got {other:?}"),
        }
    }

    #[test]
    fn read_missing_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = Frame::read_json(&path).unwrap_err();
        assert!(matches!(err, TableError::ReadFailed { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn read_malformed_file_is_distinct_from_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        let err = Frame::read_json(&path).unwrap_err();
        assert!(matches!(err, TableError::Malformed { .. }));
    }
}
