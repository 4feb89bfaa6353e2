//! Small helpers for the manual, index-based CSV column lookup used by both
//! the fetcher's `calendar.txt` scan and the gateway's `trips.txt`/
//! `shapes.txt` parse: look up each wanted column's position once against
//! the header row, then index into each record by position rather than
//! deriving a serde struct per table (GTFS tables carry many columns we
//! don't need, and not every agency feed orders or includes them the same
//! way).

use csv::StringRecord;

/// Position of `name` in `headers`, if present.
pub fn header_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// Parse GTFS date string "YYYYMMDD" to a `NaiveDate`.
pub fn parse_gtfs_date(s: &str) -> Option<chrono::NaiveDate> {
    if s.len() != 8 {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_index_finds_column() {
        let headers = StringRecord::from(vec!["trip_id", "shape_id"]);
        assert_eq!(header_index(&headers, "shape_id"), Some(1));
        assert_eq!(header_index(&headers, "missing"), None);
    }

    #[test]
    fn parse_gtfs_date_valid() {
        assert_eq!(
            parse_gtfs_date("20240315"),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
        );
    }

    #[test]
    fn parse_gtfs_date_wrong_length() {
        assert_eq!(parse_gtfs_date("2024315"), None);
    }

    #[test]
    fn parse_gtfs_date_non_numeric() {
        assert_eq!(parse_gtfs_date("abcdefgh"), None);
    }
}
