//! Run summary export.
//!
//! One row per location, in JSON, CSV or Parquet.

use std::io::{BufWriter, Write};
use std::path::Path;

use gk_sim::event::EventRecord;

use crate::metrics::LocationSummary;

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/parquet.rs"]
mod parquet;
#[path = "export/writer_utils.rs"]
mod writer_utils;

/// Export location summaries to Parquet format.
///
/// # Errors
///
/// Returns an error if `summaries` is empty, or if file creation or Parquet
/// writing fails.
pub fn export_to_parquet(
    summaries: &[LocationSummary],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    writer_utils::ensure_not_empty(summaries)?;
    let file = writer_utils::create_output_file(path)?;
    parquet::export_to_parquet_impl(summaries, file)
}

/// Export location summaries as a pretty-printed JSON array.
pub fn export_to_json(
    summaries: &[LocationSummary],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = writer_utils::create_output_file(path)?;
    json::export_to_json_impl(summaries, file)
}

/// Export location summaries to CSV with a header row.
///
/// # Errors
///
/// Returns an error if `summaries` is empty, or if file creation or CSV
/// writing fails.
pub fn export_to_csv(
    summaries: &[LocationSummary],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    writer_utils::ensure_not_empty(summaries)?;
    let file = writer_utils::create_output_file(path)?;
    csv::export_to_csv_impl(summaries, file)
}

/// Writes records that never reached their sink as NDJSON, one record per
/// line in emission order, so they can be replayed into the volume by hand.
///
/// # Errors
///
/// Returns an error if `records` is empty, or if file creation or encoding
/// fails.
pub fn export_unflushed_events(
    records: &[EventRecord],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if records.is_empty() {
        return Err("No unflushed events to export".into());
    }
    let mut out = BufWriter::new(writer_utils::create_output_file(path)?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
