//! Append-only audit ledger.
//!
//! One CSV row per processed idea, written immediately after the idea
//! reaches a terminal status. Rows are only ever appended; a fresh ledger
//! file is created per run so no run ever rewrites another's history.

use crate::errors::LedgerError;
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column header of every ledger file.
pub const LEDGER_HEADER: &str =
    "Timestamp,Provider,Seed_Idea,Factor_Name,Status,Code_Path,Formula,Description";

/// Recorded in place of a path for artifacts that were deleted.
pub const DELETED_SENTINEL: &str = "Deleted";

/// Terminal status of one processed idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    /// An execution succeeded and the artifact was retained.
    Success,
    /// Every execution attempt failed and the artifact was deleted.
    Fail,
    /// The collaborator produced no code at all; nothing was executed.
    GenCodeFail,
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalStatus::Success => write!(f, "Success"),
            TerminalStatus::Fail => write!(f, "Fail"),
            TerminalStatus::GenCodeFail => write!(f, "GenCodeFail"),
        }
    }
}

/// One ledger row, minus the timestamp added at write time.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub provider: String,
    pub seed_idea: String,
    pub factor_name: String,
    pub status: TerminalStatus,
    /// Artifact path for retained artifacts, [`DELETED_SENTINEL`] for
    /// deleted ones, empty when nothing was ever written.
    pub code_path: String,
    pub formula: String,
    pub description: String,
}

/// Writes audit records to one CSV file.
pub struct LedgerRecorder {
    path: PathBuf,
}

impl LedgerRecorder {
    /// Open a fresh, timestamp-named ledger in `dir`.
    pub fn create(dir: &Path) -> Result<Self, LedgerError> {
        let filename = format!(
            "factor_records_{}.csv",
            Local::now().format("%Y%m%d_%H%M%S")
        );
        Self::at_path(dir.join(filename))
    }

    /// Open a ledger at an exact path, writing the header only when the
    /// file does not exist yet.
    pub fn at_path(path: PathBuf) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateFailed {
                path: path.clone(),
                source,
            })?;
        }
        if !path.exists() {
            std::fs::write(&path, format!("{LEDGER_HEADER}\n")).map_err(|source| {
                LedgerError::CreateFailed {
                    path: path.clone(),
                    source,
                }
            })?;
            info!(path = %path.display(), "audit ledger created");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row. The timestamp is taken at call time.
    pub fn record(&self, record: &AuditRecord) -> Result<(), LedgerError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let status = record.status.to_string();
        let fields = [
            timestamp.as_str(),
            record.provider.as_str(),
            record.seed_idea.as_str(),
            record.factor_name.as_str(),
            status.as_str(),
            record.code_path.as_str(),
            record.formula.as_str(),
            record.description.as_str(),
        ];
        let row = fields
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",");

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::AppendFailed {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{row}").map_err(|source| LedgerError::AppendFailed {
            path: self.path.clone(),
            source,
        })
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, status: TerminalStatus) -> AuditRecord {
        AuditRecord {
            provider: "deepseek".to_string(),
            seed_idea: "volume divergence".to_string(),
            factor_name: name.to_string(),
            status,
            code_path: match status {
                TerminalStatus::Success => format!("codes/{name}.rhai"),
                TerminalStatus::Fail => DELETED_SENTINEL.to_string(),
                TerminalStatus::GenCodeFail => String::new(),
            },
            formula: "rank(volume)".to_string(),
            description: "test factor".to_string(),
        }
    }

    #[test]
    fn header_is_written_once_and_rows_append() {
        let dir = tempdir().unwrap();
        let ledger = LedgerRecorder::at_path(dir.path().join("records.csv")).unwrap();
        ledger.record(&record("AlphaOne", TerminalStatus::Success)).unwrap();
        ledger.record(&record("AlphaTwo", TerminalStatus::Fail)).unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LEDGER_HEADER);
        assert!(lines[1].contains("AlphaOne"));
        assert!(lines[1].contains("Success"));
        assert!(lines[2].contains("AlphaTwo"));
        assert!(lines[2].contains("Deleted"));
    }

    #[test]
    fn every_row_has_all_eight_fields() {
        let dir = tempdir().unwrap();
        let ledger = LedgerRecorder::at_path(dir.path().join("records.csv")).unwrap();
        ledger
            .record(&record("AlphaGen", TerminalStatus::GenCodeFail))
            .unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert_eq!(row.split(',').count(), 8);
        assert!(row.contains("GenCodeFail"));
        // GenCodeFail means nothing was written, so the path field is empty.
        assert!(row.contains(",,") || row.ends_with(','));
    }

    #[test]
    fn fields_with_delimiters_are_quoted() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn reopening_an_existing_ledger_keeps_the_header_single() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.csv");
        {
            let ledger = LedgerRecorder::at_path(path.clone()).unwrap();
            ledger.record(&record("AlphaOne", TerminalStatus::Success)).unwrap();
        }
        let ledger = LedgerRecorder::at_path(path.clone()).unwrap();
        ledger.record(&record("AlphaTwo", TerminalStatus::Success)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(LEDGER_HEADER).count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn created_ledgers_are_timestamp_named() {
        let dir = tempdir().unwrap();
        let ledger = LedgerRecorder::create(dir.path()).unwrap();
        let name = ledger.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("factor_records_"));
        assert!(name.ends_with(".csv"));
        assert!(ledger.path().exists());
    }
}
