//! Static snapshot processor (spec §4.4): extract `calendar.txt` from the
//! zipped GTFS bundle and take the minimum `start_date` as the snapshot's
//! `calendar_date`. Any failure falls back to the sentinel date but still
//! preserves the raw/gzipped bytes for the archive. The gateway performs
//! the deeper `trips.txt`/`shapes.txt` parse (spec §4.7).

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use std::io::Cursor;
use transit_core::{csv_util, gzip};

/// `1970-01-01`: signals "parse failed / invalid".
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

#[derive(Debug, Clone)]
pub struct StaticSnapshot {
    pub raw_bytes: Bytes,
    pub gzipped_bytes: Bytes,
    pub fetched_at: DateTime<Utc>,
    pub calendar_date: NaiveDate,
}

impl StaticSnapshot {
    pub fn is_valid(&self) -> bool {
        self.calendar_date > sentinel_date()
    }
}

pub fn process_static(raw_data: Bytes, fetched_at: DateTime<Utc>) -> StaticSnapshot {
    let gzipped_data = match gzip::compress(&raw_data) {
        Ok(g) => Bytes::from(g),
        Err(e) => {
            tracing::error!(error = %e, "failed to gzip static payload");
            Bytes::new()
        }
    };

    let calendar_date = match min_calendar_start_date(&raw_data) {
        Ok(date) => date,
        Err(e) => {
            tracing::error!(error = %e, "error parsing GTFS static data");
            sentinel_date()
        }
    };

    StaticSnapshot {
        raw_bytes: raw_data,
        gzipped_bytes: gzipped_data,
        fetched_at,
        calendar_date,
    }
}

fn min_calendar_start_date(raw_zip: &[u8]) -> Result<NaiveDate, transit_core::CoreError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(raw_zip))?;
    let file = archive.by_name("calendar.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();
    let idx_start = csv_util::header_index(&headers, "start_date")
        .ok_or_else(|| transit_core::CoreError::ParseError("calendar.txt missing start_date".into()))?;

    let mut min_date = None;
    for result in rdr.records() {
        let record = result?;
        let Some(raw) = record.get(idx_start) else {
            continue;
        };
        let Some(date) = csv_util::parse_gtfs_date(raw) else {
            tracing::warn!(value = raw, "skipping calendar.txt row with unparseable start_date");
            continue;
        };
        min_date = Some(match min_date {
            Some(current) if current <= date => current,
            _ => date,
        });
    }

    min_date.ok_or_else(|| transit_core::CoreError::ParseError("calendar.txt had no usable rows".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with_calendar(csv_body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            writer
                .start_file("calendar.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(csv_body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn takes_minimum_start_date_across_rows() {
        let csv_body = "\
service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date
WD,1,1,1,1,1,0,0,20240301,20241231
WE,0,0,0,0,0,1,1,20240215,20241231
";
        let zip_bytes = zip_with_calendar(csv_body);
        let date = min_calendar_start_date(&zip_bytes).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
    }

    #[test]
    fn missing_calendar_file_is_invalid_but_preserves_raw() {
        let buf = {
            let mut b = Vec::new();
            let writer = zip::ZipWriter::new(Cursor::new(&mut b));
            writer.finish().unwrap();
            b
        };
        let snapshot = process_static(Bytes::from(buf.clone()), Utc::now());
        assert!(!snapshot.is_valid());
        assert_eq!(snapshot.raw_bytes.as_ref(), buf.as_slice());
    }

    #[test]
    fn malformed_start_date_row_is_skipped_not_fatal() {
        let csv_body = "\
service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date
WD,1,1,1,1,1,0,0,notadate,20241231
WE,0,0,0,0,0,1,1,20240501,20241231
";
        let zip_bytes = zip_with_calendar(csv_body);
        let date = min_calendar_start_date(&zip_bytes).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }
}
