//! CSV ingest and validation for the two run inputs.
//!
//! This module is responsible for turning:
//! - a processed returns file (`Date`, `LogReturn`) into a [`ReturnSeries`]
//! - a curated events file (`Date`, `Event_Description`, `Event_Type`) into an
//!   [`EventCatalog`]
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors, `DataFormat` kind)
//! - **No silent repair**: out-of-order or duplicate dates are errors, not cleanup
//! - **Separation of concerns**: no modeling logic here

use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use log::{debug, info};

use crate::domain::{EventCatalog, EventRecord, ReturnObs, ReturnSeries};
use crate::error::{AppError, open_input};

/// Load a log-return series.
///
/// Rows whose `LogReturn` is empty (or a `NaN`-style marker) are dropped. The
/// remaining rows must be strictly increasing in date; the file is not re-sorted.
pub fn load_returns(path: &Path) -> Result<ReturnSeries, AppError> {
    let file = open_input(path, "returns CSV")?;
    let mut reader = csv_reader(file);
    let headers = read_headers(&mut reader, path)?;
    let header_map = build_header_map(&headers);

    ensure_columns(&header_map, &["date", "logreturn"], path)?;

    let mut obs: Vec<ReturnObs> = Vec::new();
    let mut dropped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and CSV lines are 1-based.
        let line = idx + 2;
        let record = result.map_err(|e| AppError::data_format(format!("CSV parse error at line {line}: {e}")))?;

        let Some(raw_return) = get_optional(&record, &header_map, "logreturn") else {
            dropped += 1;
            continue;
        };
        if is_missing_marker(raw_return) {
            dropped += 1;
            continue;
        }

        let date = get_required(&record, &header_map, "date")
            .and_then(parse_date)
            .map_err(|e| AppError::data_format(format!("{}:{line}: {e}", path.display())))?;
        let log_return = raw_return.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
            AppError::data_format(format!(
                "{}:{line}: invalid `LogReturn` value '{raw_return}'.",
                path.display()
            ))
        })?;

        if let Some(prev) = obs.last() {
            if date <= prev.date {
                return Err(AppError::data_format(format!(
                    "{}:{line}: dates must be strictly increasing ({date} follows {}).",
                    path.display(),
                    prev.date
                )));
            }
        }

        obs.push(ReturnObs { date, log_return });
    }

    if obs.is_empty() {
        return Err(AppError::data_format(format!(
            "No valid return rows in '{}'.",
            path.display()
        )));
    }

    if dropped > 0 {
        debug!("dropped {dropped} row(s) with a missing LogReturn");
    }
    info!("loaded {} returns from {}", obs.len(), path.display());

    Ok(ReturnSeries::new(obs))
}

/// Load the event catalog, sorted ascending by date.
///
/// Fails on an empty catalog, unparseable dates, empty descriptions/types, and
/// duplicate dates (duplicates would make nearest-event matching ambiguous).
pub fn load_events(path: &Path) -> Result<EventCatalog, AppError> {
    let file = open_input(path, "events CSV")?;
    let mut reader = csv_reader(file);
    let headers = read_headers(&mut reader, path)?;
    let header_map = build_header_map(&headers);

    ensure_columns(&header_map, &["date", "event_description", "event_type"], path)?;

    let mut events = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::data_format(format!("CSV parse error at line {line}: {e}")))?;

        let event = parse_event(&record, &header_map)
            .map_err(|e| AppError::data_format(format!("{}:{line}: {e}", path.display())))?;
        events.push(event);
    }

    if events.is_empty() {
        return Err(AppError::data_format(format!(
            "No events in '{}'; at least one is needed to match change points.",
            path.display()
        )));
    }

    // Stable sort keeps file order among equal dates, which we reject below anyway.
    events.sort_by_key(|e| e.date);

    if let Some(w) = events.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(AppError::data_format(format!(
            "Duplicate event date {} in '{}' ('{}' and '{}').",
            w[0].date,
            path.display(),
            w[0].description,
            w[1].description
        )));
    }

    info!("loaded {} events from {}", events.len(), path.display());
    Ok(EventCatalog { events })
}

fn parse_event(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<EventRecord, String> {
    let date = parse_date(get_required(record, header_map, "date")?)?;
    let description = get_required(record, header_map, "event_description")?.to_string();
    let event_type = get_required(record, header_map, "event_type")?.to_string();
    Ok(EventRecord {
        date,
        description,
        event_type,
    })
}

pub(crate) fn csv_reader(file: std::fs::File) -> csv::Reader<std::fs::File> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file)
}

pub(crate) fn read_headers(reader: &mut csv::Reader<std::fs::File>, path: &Path) -> Result<StringRecord, AppError> {
    reader
        .headers()
        .map(|h| h.clone())
        .map_err(|e| AppError::data_format(format!("Failed to read CSV headers of '{}': {e}", path.display())))
}

pub(crate) fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

pub(crate) fn ensure_columns(
    header_map: &HashMap<String, usize>,
    required: &[&str],
    path: &Path,
) -> Result<(), AppError> {
    for name in required {
        if !header_map.contains_key(*name) {
            return Err(AppError::data_format(format!(
                "Missing required column `{name}` in '{}'.",
                path.display()
            )));
        }
    }
    Ok(())
}

pub(crate) fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

pub(crate) fn get_optional<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn is_missing_marker(s: &str) -> bool {
    matches!(s, "nan" | "NaN" | "NAN" | "NA" | "N/A" | "null" | "None")
}

/// Parse a date in one of the formats seen in price/event exports.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 7] = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d-%b-%y",
        "%d-%b-%Y",
        "%b %d, %Y",
        "%d %b %Y",
    ];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    // Timestamps written by dataframe tools (`2020-01-02 00:00:00`).
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected e.g. YYYY-MM-DD, MM/DD/YYYY, DD-Mon-YY or 'Mon DD, YYYY'."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::export::write_returns_csv;
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("regime_breaks_ingest_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_date_accepts_common_formats() {
        assert_eq!(parse_date("2020-01-10").unwrap(), d(2020, 1, 10));
        assert_eq!(parse_date("20-May-87").unwrap(), d(1987, 5, 20));
        assert_eq!(parse_date("Apr 22, 2020").unwrap(), d(2020, 4, 22));
        assert_eq!(parse_date("2020-01-10 00:00:00").unwrap(), d(2020, 1, 10));
        assert!(parse_date("not a date").is_err());
    }

    #[test]
    fn returns_drop_missing_values() {
        let dir = test_dir("drop");
        let path = dir.join("returns.csv");
        std::fs::write(
            &path,
            "Date,Price,LogReturn\n2020-01-01,10,\n2020-01-02,11,0.0953\n2020-01-03,11,NaN\n2020-01-06,12,0.087\n",
        )
        .unwrap();

        let series = load_returns(&path).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.obs[0].date, d(2020, 1, 2));
        assert!((series.obs[1].log_return - 0.087).abs() < 1e-15);
    }

    #[test]
    fn returns_round_trip_through_writer() {
        let dir = test_dir("roundtrip");
        let path = dir.join("returns.csv");
        let series = ReturnSeries::new(vec![
            ReturnObs { date: d(2019, 12, 30), log_return: -0.012345678901234 },
            ReturnObs { date: d(2019, 12, 31), log_return: 0.0 },
            ReturnObs { date: d(2020, 1, 2), log_return: 1.0e-9 },
            ReturnObs { date: d(2020, 1, 3), log_return: 0.1 + 0.2 },
        ]);

        write_returns_csv(&path, &series).unwrap();
        let reloaded = load_returns(&path).unwrap();
        assert_eq!(reloaded, series);
    }

    #[test]
    fn returns_out_of_order_is_data_format() {
        let dir = test_dir("order");
        let path = dir.join("returns.csv");
        std::fs::write(&path, "Date,LogReturn\n2020-01-02,0.1\n2020-01-01,0.2\n").unwrap();

        let err = load_returns(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn returns_missing_file_is_not_found() {
        let dir = test_dir("missing");
        let err = load_returns(&dir.join("nope.csv")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn header_only_events_file_is_data_format() {
        let dir = test_dir("events_empty");
        let path = dir.join("events.csv");
        std::fs::write(&path, "Date,Event_Description,Event_Type\n").unwrap();

        let err = load_events(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn events_are_sorted_by_date() {
        let dir = test_dir("events_sorted");
        let path = dir.join("events.csv");
        std::fs::write(
            &path,
            "Date,Event_Description,Event_Type\n2020-06-01,\"OPEC+ cut, extended\",Policy\n2020-01-01,Outbreak,Health\n",
        )
        .unwrap();

        let catalog = load_events(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.events[0].date, d(2020, 1, 1));
        assert_eq!(catalog.events[1].description, "OPEC+ cut, extended");
    }

    #[test]
    fn events_with_duplicate_dates_fail() {
        let dir = test_dir("events_dup");
        let path = dir.join("events.csv");
        std::fs::write(
            &path,
            "Date,Event_Description,Event_Type\n2020-01-01,A,X\n2020-03-01,B,Y\n2020-01-01,C,Z\n",
        )
        .unwrap();

        let err = load_events(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
        assert!(err.message().contains("Duplicate event date 2020-01-01"));
    }

    #[test]
    fn events_missing_type_fail() {
        let dir = test_dir("events_type");
        let path = dir.join("events.csv");
        std::fs::write(&path, "Date,Event_Description,Event_Type\n2020-01-01,A,\n").unwrap();

        let err = load_events(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn events_bad_date_fail() {
        let dir = test_dir("events_date");
        let path = dir.join("events.csv");
        std::fs::write(&path, "Date,Event_Description,Event_Type\nsoon,A,B\n").unwrap();

        assert_eq!(load_events(&path).unwrap_err().kind(), ErrorKind::DataFormat);
    }
}
