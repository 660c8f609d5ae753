use crate::metrics::LocationSummary;

pub(crate) fn export_to_csv_impl(
    summaries: &[LocationSummary],
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_writer(file);
    // Header comes from the struct's field names.
    for summary in summaries {
        wtr.serialize(summary)?;
    }
    wtr.flush()?;
    Ok(())
}
