//! Factor script execution and output contract enforcement.
//!
//! Execution failures are values, not errors: every defect in a script's
//! behavior becomes an `ExecutionOutcome` whose detail feeds the repair
//! prompt. Only the host process itself can fail harder than that.

use crate::data::DataBundle;
use crate::script::{BoundUnit, ScriptHost};
use crate::table::{Column, Frame};
use std::path::PathBuf;
use tracing::debug;

/// Instrument identifier column required in every factor output.
pub const INSTRUMENT_KEY: &str = "SecuCode";
/// Trading day column required in every factor output.
pub const TRADING_DAY_KEY: &str = "TradingDay";
/// Key columns every factor output must carry, in persisted order.
pub const REQUIRED_KEY_COLUMNS: [&str; 2] = [INSTRUMENT_KEY, TRADING_DAY_KEY];
/// Extension of persisted factor value files.
pub const FACTOR_FILE_EXT: &str = "json";

/// Instrument codes are normalized to this many characters.
const CODE_WIDTH: usize = 6;

/// Result of one factor script execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub ok: bool,
    /// `"Success"` when ok, otherwise a diagnostic for the repair prompt.
    pub detail: String,
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            detail: "Success".to_string(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Runs bound factor scripts against the loaded data and persists their
/// output tables.
pub struct FactorRunner {
    data: DataBundle,
    factor_dir: PathBuf,
}

impl FactorRunner {
    pub fn new(data: DataBundle, factor_dir: impl Into<PathBuf>) -> Self {
        Self {
            data,
            factor_dir: factor_dir.into(),
        }
    }

    /// Where an artifact's factor values land.
    pub fn factor_path(&self, artifact_name: &str) -> PathBuf {
        self.factor_dir
            .join(format!("{artifact_name}.{FACTOR_FILE_EXT}"))
    }

    /// Execute one bound script and persist its output.
    ///
    /// Scripts receive copies of the panels, so nothing they do can
    /// corrupt the data for later attempts. All failure modes come back
    /// as a failed outcome; this never returns an error.
    pub fn run(&self, host: &ScriptHost, unit: &BoundUnit, artifact_name: &str) -> ExecutionOutcome {
        let result = match host.call(unit, self.data.panel.clone(), self.data.index.clone()) {
            Ok(value) => value,
            Err(err) => return ExecutionOutcome::failure(format!("Runtime error: {err}")),
        };

        let returned_type = result.type_name().to_string();
        let Some(mut frame) = result.try_cast::<Frame>() else {
            return ExecutionOutcome::failure(format!(
                "Type contract violation: expected a frame value, got {returned_type}"
            ));
        };

        let missing: Vec<&str> = REQUIRED_KEY_COLUMNS
            .iter()
            .copied()
            .filter(|name| !frame.has_column(name))
            .collect();
        if !missing.is_empty() {
            return ExecutionOutcome::failure(format!(
                "Missing required key columns: {}",
                missing.join(", ")
            ));
        }
        if !frame.has_column(artifact_name) {
            return ExecutionOutcome::failure(format!("Missing factor column: {artifact_name}"));
        }

        let wanted = [INSTRUMENT_KEY, TRADING_DAY_KEY, artifact_name];
        let mut output = match frame.select(&wanted) {
            Ok(output) => output,
            Err(err) => return ExecutionOutcome::failure(format!("Output selection failed: {err}")),
        };

        if let Err(err) = normalize_instrument_codes(&mut output) {
            return ExecutionOutcome::failure(format!("Instrument code normalization failed: {err}"));
        }

        let path = self.factor_path(artifact_name);
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                return ExecutionOutcome::failure(format!(
                    "Failed to persist factor values: {err}"
                ));
            }
        }
        if let Err(err) = output.write_json(&path) {
            return ExecutionOutcome::failure(format!("Failed to persist factor values: {err}"));
        }

        debug!(artifact = artifact_name, path = %path.display(), "factor values persisted");
        ExecutionOutcome::success()
    }
}

/// Rewrite the instrument column as fixed-width string codes: values are
/// stringified, cut to six characters, then left-padded with zeros.
fn normalize_instrument_codes(frame: &mut Frame) -> Result<(), crate::errors::TableError> {
    let Some(column) = frame.column(INSTRUMENT_KEY) else {
        return Ok(());
    };
    let normalized: Vec<String> = match column {
        Column::Int(values) => values.iter().map(|v| zero_pad(&v.to_string())).collect(),
        Column::Float(values) => values.iter().map(|v| zero_pad(&v.to_string())).collect(),
        Column::Str(values) => values.iter().map(|v| zero_pad(v)).collect(),
    };
    frame.set_column(INSTRUMENT_KEY, Column::Str(normalized))
}

fn zero_pad(code: &str) -> String {
    let truncated: String = code.chars().take(CODE_WIDTH).collect();
    format!("{:0>width$}", truncated, width = CODE_WIDTH)
}
