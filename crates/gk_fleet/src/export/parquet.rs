use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt32Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::metrics::LocationSummary;

pub(crate) fn export_to_parquet_impl(
    summaries: &[LocationSummary],
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let batch = build_record_batch(summaries)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

fn build_record_batch(
    summaries: &[LocationSummary],
) -> Result<RecordBatch, arrow::error::ArrowError> {
    RecordBatch::try_new(Arc::new(parquet_schema()), build_arrays(summaries))
}

fn parquet_schema() -> Schema {
    Schema::new(vec![
        Field::new("location", DataType::Utf8, false),
        Field::new("window_start", DataType::Utf8, false),
        Field::new("days_simulated", DataType::UInt32, false),
        Field::new("orders_admitted", DataType::UInt64, false),
        Field::new("orders_skipped", DataType::UInt64, false),
        Field::new("orders_delivered", DataType::UInt64, false),
        Field::new("events_emitted", DataType::UInt64, false),
        Field::new("flushes", DataType::UInt64, false),
        Field::new("writer_retries", DataType::UInt64, false),
        Field::new("fields_corrupted", DataType::UInt64, false),
        Field::new("avg_prep_minutes", DataType::Float64, false),
        Field::new("avg_delivery_minutes", DataType::Float64, false),
        Field::new("avg_total_minutes", DataType::Float64, false),
        Field::new("p50_total_minutes", DataType::Float64, false),
        Field::new("p75_total_minutes", DataType::Float64, false),
        Field::new("p99_total_minutes", DataType::Float64, false),
        Field::new("stop_reason", DataType::Utf8, false),
    ])
}

fn strings(summaries: &[LocationSummary], f: impl Fn(&LocationSummary) -> &str) -> ArrayRef {
    Arc::new(StringArray::from(summaries.iter().map(f).collect::<Vec<_>>()))
}

fn counts(summaries: &[LocationSummary], f: impl Fn(&LocationSummary) -> u64) -> ArrayRef {
    Arc::new(UInt64Array::from(summaries.iter().map(f).collect::<Vec<_>>()))
}

fn minutes(summaries: &[LocationSummary], f: impl Fn(&LocationSummary) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from(summaries.iter().map(f).collect::<Vec<_>>()))
}

fn build_arrays(summaries: &[LocationSummary]) -> Vec<ArrayRef> {
    vec![
        strings(summaries, |s| &s.location),
        strings(summaries, |s| &s.window_start),
        Arc::new(UInt32Array::from(
            summaries
                .iter()
                .map(|s| s.days_simulated)
                .collect::<Vec<_>>(),
        )),
        counts(summaries, |s| s.orders_admitted),
        counts(summaries, |s| s.orders_skipped),
        counts(summaries, |s| s.orders_delivered),
        counts(summaries, |s| s.events_emitted),
        counts(summaries, |s| s.flushes),
        counts(summaries, |s| s.writer_retries),
        counts(summaries, |s| s.fields_corrupted),
        minutes(summaries, |s| s.avg_prep_minutes),
        minutes(summaries, |s| s.avg_delivery_minutes),
        minutes(summaries, |s| s.avg_total_minutes),
        minutes(summaries, |s| s.p50_total_minutes),
        minutes(summaries, |s| s.p75_total_minutes),
        minutes(summaries, |s| s.p99_total_minutes),
        strings(summaries, |s| &s.stop_reason),
    ]
}
