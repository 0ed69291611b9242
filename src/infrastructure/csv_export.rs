// CSV export of the retained history
use crate::domain::telemetry::Observation;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write;

pub const CSV_HEADER: &str = "Timestamp,Weight";

#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub filename: String,
    pub body: String,
    pub rows: usize,
}

/// Render observations oldest first, one row each
pub fn export_csv<'a>(
    observations: impl IntoIterator<Item = &'a Observation>,
    exported_at: DateTime<Utc>,
) -> CsvExport {
    let mut body = String::from(CSV_HEADER);
    body.push('\n');

    let mut rows = 0;
    for observation in observations {
        // Writing into a String cannot fail.
        let _ = writeln!(
            body,
            "{},{:.2}",
            observation
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            observation.weight
        );
        rows += 1;
    }

    CsvExport {
        filename: format!("weight-data-{}.csv", exported_at.format("%Y-%m-%dT%H-%M-%S")),
        body,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_export_rows_and_filename() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 9, 15, 0).unwrap();
        let data = vec![Observation::new(12.0, ts), Observation::new(3.456, ts)];

        let export = export_csv(&data, Utc.with_ymd_and_hms(2026, 10, 19, 14, 3, 5).unwrap());

        assert_eq!(export.rows, 2);
        assert_eq!(export.filename, "weight-data-2026-10-19T14-03-05.csv");
        assert_eq!(
            export.body,
            "Timestamp,Weight\n\
             2026-10-19T09:15:00.000Z,12.00\n\
             2026-10-19T09:15:00.000Z,3.46\n"
        );
    }

    #[test]
    fn test_export_empty_has_header_only() {
        let empty: Vec<Observation> = Vec::new();
        let export = export_csv(&empty, Utc::now());
        assert_eq!(export.rows, 0);
        assert_eq!(export.body, "Timestamp,Weight\n");
    }
}
