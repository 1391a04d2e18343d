//! Raw price file -> processed log-return file.
//!
//! This is the deterministic preparation step that feeds [`load_returns`]:
//!
//! 1. parse dates, dropping rows whose date cannot be parsed
//! 2. sort ascending and reject duplicate dates
//! 3. reject non-positive / non-finite prices
//! 4. optionally insert missing weekdays with linearly interpolated prices
//! 5. `LogReturn_t = ln(P_t / P_{t-1})`, dropping the first row
//!
//! Gap filling changes which index maps to which date in the model, so it is
//! an explicit option and off by default.
//!
//! [`load_returns`]: crate::io::load_returns

use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::{info, warn};

use crate::domain::PrepareConfig;
use crate::error::{AppError, open_input};
use crate::io::export::write_prices_csv;
use crate::io::ingest::{build_header_map, csv_reader, ensure_columns, get_optional, parse_date, read_headers};

/// One processed row: the price and its log-return against the previous row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub price: f64,
    pub log_return: f64,
    /// True when the row was inserted by gap filling.
    pub interpolated: bool,
}

/// Output of the preparation step.
#[derive(Debug, Clone)]
pub struct PreparedPrices {
    pub rows: Vec<PriceRow>,
    pub rows_read: usize,
    pub dropped_dates: usize,
    pub filled: usize,
}

/// Run the full preparation step and write the processed CSV.
pub fn prepare_returns(config: &PrepareConfig) -> Result<PreparedPrices, AppError> {
    let raw = load_prices(&config.prices_path)?;
    let rows_read = raw.rows_read;
    let dropped_dates = raw.dropped_dates;

    let mut prices = raw.prices;
    prices.sort_by_key(|(date, _)| *date);
    if let Some(w) = prices.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(AppError::data_format(format!(
            "Duplicate price date {} in '{}'.",
            w[0].0,
            config.prices_path.display()
        )));
    }

    let (series, filled) = if config.fill_gaps {
        fill_weekday_gaps(&prices)
    } else {
        (prices.into_iter().map(|(d, p)| (d, p, false)).collect(), 0)
    };

    let rows = log_returns(&series);
    if rows.is_empty() {
        return Err(AppError::data_format(format!(
            "Need at least two valid prices in '{}' to compute returns.",
            config.prices_path.display()
        )));
    }

    if dropped_dates > 0 {
        warn!("dropped {dropped_dates} price row(s) with an unparseable date");
    }
    if config.fill_gaps {
        info!("gap filling inserted {filled} interpolated weekday price(s)");
    }

    if let Some(dir) = config.output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::io(format!("Failed to create directory '{}': {e}", dir.display())))?;
    }
    write_prices_csv(&config.output_path, &rows)?;
    info!("wrote {} returns to {}", rows.len(), config.output_path.display());

    Ok(PreparedPrices {
        rows,
        rows_read,
        dropped_dates,
        filled,
    })
}

struct RawPrices {
    prices: Vec<(NaiveDate, f64)>,
    rows_read: usize,
    dropped_dates: usize,
}

fn load_prices(path: &Path) -> Result<RawPrices, AppError> {
    let file = open_input(path, "prices CSV")?;
    let mut reader = csv_reader(file);
    let headers = read_headers(&mut reader, path)?;
    let header_map = build_header_map(&headers);
    ensure_columns(&header_map, &["date", "price"], path)?;

    let mut prices = Vec::new();
    let mut rows_read = 0usize;
    let mut dropped_dates = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = result.map_err(|e| AppError::data_format(format!("CSV parse error at line {line}: {e}")))?;

        let Some(date) = get_optional(&record, &header_map, "date").and_then(|s| parse_date(s).ok()) else {
            dropped_dates += 1;
            continue;
        };

        let raw = get_optional(&record, &header_map, "price").unwrap_or("");
        let price = raw.parse::<f64>().ok().filter(|p| p.is_finite() && *p > 0.0).ok_or_else(|| {
            AppError::data_format(format!(
                "{}:{line}: price must be a positive number (got '{raw}').",
                path.display()
            ))
        })?;

        prices.push((date, price));
    }

    Ok(RawPrices {
        prices,
        rows_read,
        dropped_dates,
    })
}

/// Insert every missing weekday between consecutive observations.
///
/// Inserted prices are linear in calendar days between the two neighbors.
fn fill_weekday_gaps(prices: &[(NaiveDate, f64)]) -> (Vec<(NaiveDate, f64, bool)>, usize) {
    let mut out = Vec::with_capacity(prices.len());
    let mut filled = 0usize;

    for (i, &(date, price)) in prices.iter().enumerate() {
        if let Some(&(prev_date, prev_price)) = i.checked_sub(1).and_then(|j| prices.get(j)) {
            let span = (date - prev_date).num_days() as f64;
            let mut cursor = prev_date + Duration::days(1);
            while cursor < date {
                if is_weekday(cursor) {
                    let u = (cursor - prev_date).num_days() as f64 / span;
                    out.push((cursor, prev_price + u * (price - prev_price), true));
                    filled += 1;
                }
                cursor += Duration::days(1);
            }
        }
        out.push((date, price, false));
    }

    (out, filled)
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn log_returns(series: &[(NaiveDate, f64, bool)]) -> Vec<PriceRow> {
    series
        .windows(2)
        .map(|w| {
            let (_, p0, _) = w[0];
            let (date, price, interpolated) = w[1];
            PriceRow {
                date,
                price,
                log_return: (price / p0).ln(),
                interpolated,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::load_returns;
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("regime_breaks_prices_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn prepare_sorts_and_computes_log_returns() {
        let dir = test_dir("basic");
        let prices = dir.join("raw.csv");
        let out = dir.join("returns.csv");
        std::fs::write(&prices, "Date,Price\n21-May-87,18.45\n20-May-87,18.63\nbad,1.0\n22-May-87,18.55\n").unwrap();

        let prepared = prepare_returns(&PrepareConfig {
            prices_path: prices,
            output_path: out.clone(),
            fill_gaps: false,
        })
        .unwrap();

        assert_eq!(prepared.rows_read, 4);
        assert_eq!(prepared.dropped_dates, 1);
        assert_eq!(prepared.rows.len(), 2);
        assert_eq!(prepared.rows[0].date, d(1987, 5, 21));
        assert!((prepared.rows[0].log_return - (18.45f64 / 18.63).ln()).abs() < 1e-12);

        let series = load_returns(&out).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.obs[1].log_return, prepared.rows[1].log_return);
    }

    #[test]
    fn prepare_creates_missing_output_directory() {
        let dir = test_dir("nested");
        let prices = dir.join("raw.csv");
        let out = dir.join("data").join("processed").join("returns.csv");
        let _ = std::fs::remove_dir_all(dir.join("data"));
        std::fs::write(&prices, "Date,Price\n2020-01-02,10\n2020-01-03,11\n").unwrap();

        prepare_returns(&PrepareConfig {
            prices_path: prices,
            output_path: out.clone(),
            fill_gaps: false,
        })
        .unwrap();
        assert_eq!(load_returns(&out).unwrap().len(), 1);
    }

    #[test]
    fn non_positive_price_is_data_format() {
        let dir = test_dir("neg");
        let prices = dir.join("raw.csv");
        std::fs::write(&prices, "Date,Price\n2020-04-17,25.0\n2020-04-20,-37.6\n").unwrap();

        let err = prepare_returns(&PrepareConfig {
            prices_path: prices,
            output_path: dir.join("out.csv"),
            fill_gaps: false,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn gap_filling_interpolates_missing_weekdays_only() {
        // Fri 2020-01-03 -> Wed 2020-01-08: Mon 6 and Tue 7 are missing weekdays.
        let prices = vec![(d(2020, 1, 3), 10.0), (d(2020, 1, 8), 15.0)];
        let (filled, n) = fill_weekday_gaps(&prices);

        assert_eq!(n, 2);
        let dates: Vec<NaiveDate> = filled.iter().map(|r| r.0).collect();
        assert_eq!(dates, vec![d(2020, 1, 3), d(2020, 1, 6), d(2020, 1, 7), d(2020, 1, 8)]);
        assert!((filled[1].1 - 13.0).abs() < 1e-12);
        assert!((filled[2].1 - 14.0).abs() < 1e-12);
        assert!(filled[1].2 && !filled[3].2);
    }

    #[test]
    fn gap_filling_is_off_by_default_in_fixtures() {
        let dir = test_dir("nofill");
        let prices = dir.join("raw.csv");
        std::fs::write(&prices, "Date,Price\n2020-01-03,10\n2020-01-08,15\n").unwrap();

        let prepared = prepare_returns(&PrepareConfig {
            prices_path: prices,
            output_path: dir.join("out.csv"),
            fill_gaps: false,
        })
        .unwrap();
        assert_eq!(prepared.filled, 0);
        assert_eq!(prepared.rows.len(), 1);
    }
}
