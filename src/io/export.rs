//! CSV export for closed-loop tick reports.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::TickReport;

/// Column header for CSV tick export.
const HEADER: &str = "tick,time_s,production_kwh,consumption_kwh,battery_consumption_kwh,\
                      non_battery_consumption_kwh,curtailed_kwh,battery_kwh,active,\
                      completed,deadline_missed,new_demand,eligible,activated,denied,rejected";

/// Exports tick reports to a CSV file at the given path.
///
/// Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(reports: &[TickReport], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(reports, buf)
}

/// Writes tick reports as CSV to any writer.
///
/// `new_demand` is `member/consumer` for a tick that opened a demand and
/// empty otherwise.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(reports: &[TickReport], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in reports {
        let new_demand = r
            .generated
            .as_ref()
            .map(|d| format!("{}/{}", d.member_id, d.consumer_id))
            .unwrap_or_default();
        wtr.write_record(&[
            r.tick.to_string(),
            r.time_s.to_string(),
            format!("{:.5}", r.production_kwh),
            format!("{:.5}", r.consumption_kwh),
            format!("{:.5}", r.battery_consumption_kwh),
            format!("{:.5}", r.non_battery_consumption_kwh),
            format!("{:.5}", r.curtailed_kwh),
            format!("{:.5}", r.battery_kwh),
            r.active_consumers.to_string(),
            r.completed.to_string(),
            r.deadline_missed.to_string(),
            new_demand,
            r.eligible.to_string(),
            r.activated.to_string(),
            r.denied.to_string(),
            r.rejected.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
