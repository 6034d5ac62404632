//! Input data loading.
//!
//! Both panels must load before any provider work starts; a missing or
//! unreadable file aborts the run.

use crate::table::Frame;
use anyhow::{Result, bail};
use std::path::Path;
use tracing::info;

/// The two input panels every factor script receives.
#[derive(Debug, Clone)]
pub struct DataBundle {
    /// Daily per-stock rows.
    pub panel: Frame,
    /// Daily index rows.
    pub index: Frame,
}

/// Load both input panels, failing fast when either file is absent.
pub fn load_data(panel_path: &Path, index_path: &Path) -> Result<DataBundle> {
    let mut missing = Vec::new();
    if !panel_path.exists() {
        missing.push(panel_path.display().to_string());
    }
    if !index_path.exists() {
        missing.push(index_path.display().to_string());
    }
    if !missing.is_empty() {
        bail!("input data not found: {}", missing.join(", "));
    }

    let panel = Frame::read_json(panel_path)?;
    let index = Frame::read_json(index_path)?;
    info!(
        panel_rows = panel.rows(),
        index_rows = index.rows(),
        "input data loaded"
    );
    Ok(DataBundle { panel, index })
}
