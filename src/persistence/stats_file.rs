use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::analysis::StatsReport;
use crate::persistence::{write_atomically, WriteError};

/// Renders a report as JSON with 4-space indentation and fixed key order.
pub fn render_stats(report: &StatsReport) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    report.serialize(&mut serializer)?;
    Ok(out)
}

pub fn save_stats(report: &StatsReport, path: impl AsRef<Path>) -> Result<(), WriteError> {
    let path = path.as_ref();
    let body = render_stats(report).map_err(|e| WriteError::encode(path, e))?;

    write_atomically(path, |staging| {
        let mut file = File::create(staging).map_err(|e| WriteError::io(staging, e))?;
        file.write_all(&body).map_err(|e| WriteError::io(staging, e))?;
        file.sync_all().map_err(|e| WriteError::io(staging, e))
    })?;

    info!("Statistics saved to: {}", path.display());
    Ok(())
}

pub fn load_stats(path: impl AsRef<Path>) -> anyhow::Result<StatsReport> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
