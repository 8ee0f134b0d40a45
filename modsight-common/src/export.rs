//! Export encoders for reading snapshots.
//!
//! Pure data transformation over a `Reading` slice; no protocol or
//! scheduling logic.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::reading::Reading;

/// Export format for reading snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Structured JSON, one object per reading (default).
    #[default]
    Json,

    /// Tabular CSV, one row per reading, one column per register offset.
    Csv,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Csv => "text/csv",
        }
    }

    /// Pick a format from a file path: `.csv` means tabular, anything else
    /// is JSON.
    pub fn from_path(path: &Path) -> Format {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Format::Csv,
            _ => Format::Json,
        }
    }
}

/// Encode a reading snapshot using the specified format.
pub fn encode(readings: &[Reading], format: Format) -> Result<String> {
    match format {
        Format::Json => to_json(readings),
        Format::Csv => to_csv(readings),
    }
}

/// Encode a reading snapshot as a JSON array, one object per reading.
pub fn to_json(readings: &[Reading]) -> Result<String> {
    serde_json::to_string_pretty(readings).map_err(Error::from)
}

/// Encode a reading snapshot as CSV.
///
/// One row per reading. Register columns are sized to the widest reading in
/// the snapshot; failed readings leave their register cells blank and carry
/// the diagnostic in the `error` column.
pub fn to_csv(readings: &[Reading]) -> Result<String> {
    let width = readings
        .iter()
        .filter_map(|r| r.registers().map(<[u16]>::len))
        .max()
        .unwrap_or(0);

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<String> = ["timestamp", "device", "host", "port", "unit_id", "error"]
        .iter()
        .map(ToString::to_string)
        .collect();
    for offset in 0..width {
        header.push(format!("reg_{}", offset));
    }
    writer.write_record(&header)?;

    for reading in readings {
        let mut row: Vec<String> = vec![
            format_timestamp(reading.timestamp),
            reading.device.clone(),
            reading.host.clone(),
            reading.port.to_string(),
            reading.unit_id.to_string(),
            reading.error().unwrap_or_default().to_string(),
        ];
        let registers = reading.registers().unwrap_or_default();
        for offset in 0..width {
            row.push(
                registers
                    .get(offset)
                    .map(u16::to_string)
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&row)?;
    }

    let data = writer
        .into_inner()
        .map_err(|e| Error::Csv(e.to_string()))?;
    String::from_utf8(data).map_err(|e| Error::Csv(e.to_string()))
}

/// Render an epoch-millis timestamp as RFC 3339, falling back to the raw
/// value when it is out of chrono's range.
fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
