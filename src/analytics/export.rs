//! CSV export of visitor timelines

use csv::{QuoteStyle, WriterBuilder};

use super::models::{format_timestamp, Visitor};

pub const CSV_HEADER: [&str; 9] = [
    "IP",
    "Timestamp",
    "Device",
    "OS",
    "Browser",
    "Location",
    "Path",
    "Referrer",
    "Is Mobile",
];

/// Render one row per visit, every field quoted
///
/// The header row is always present, even when there are no visitors.
pub fn export_csv(visitors: &[Visitor]) -> Result<String, csv::Error> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;

    for visitor in visitors {
        for visit in &visitor.visits {
            writer.write_record([
                visit.ip.as_str(),
                &format_timestamp(&visit.timestamp),
                visit.device_label(),
                visit.os_label(),
                visit.browser_label(),
                &visit.location_label(),
                visit.path_label(),
                visit.referrer_label(),
                if visit.is_mobile { "Yes" } else { "No" },
            ])?;
        }
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
