// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wall-clock timestamps in the wire format.

use chrono::{Local, NaiveDateTime};

/// The timestamp format every published payload uses.
pub const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The router's wall clock, formatted for the wire.
///
/// Device clocks are unsynchronized; everything the router stamps uses its
/// own clock so that ordering within the store is coherent.
#[must_use]
pub fn wall_clock() -> String {
    Local::now().format(WIRE_FORMAT).to_string()
}

/// Format a stored timestamp for the wire.
#[must_use]
pub fn format(ts: NaiveDateTime) -> String {
    ts.format(WIRE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn wire_format_shape() {
        let ts = wall_clock();
        assert_eq!(ts.len(), 19);
        assert_eq!(ts.as_bytes()[4], b'-');
        assert_eq!(ts.as_bytes()[10], b' ');
        assert_eq!(ts.as_bytes()[13], b':');
    }

    #[test]
    fn formats_stored_timestamps() {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(18, 4, 5)
            .unwrap();
        assert_eq!(format(ts), "2025-03-09 18:04:05");
    }
}
