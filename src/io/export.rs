//! Export tables to CSV / text.
//!
//! All dates are written as `YYYY-MM-DD` and floats with Rust's shortest
//! round-trip formatting, so the files can be reloaded without loss and
//! republished as-is by downstream readers.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::{ChangePointEstimate, ConvergenceSummary, MatchedEvent, ReturnSeries};
use crate::error::AppError;
use crate::io::prices::PriceRow;
use crate::report::format_summary_table;

/// Written into an `Impact_Percent` cell when the impact is undefined.
pub const IMPACT_NOT_COMPUTABLE: &str = "NaN";

/// Fixed artifact layout of one run below the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub output_dir: PathBuf,
    pub summaries: PathBuf,
    pub trace: PathBuf,
    pub change_points: PathBuf,
    pub matched_events: PathBuf,
    pub trace_plot: PathBuf,
    pub overlay_plot: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path) -> Self {
        let figures = output_dir.join("figures");
        Self {
            output_dir: output_dir.to_path_buf(),
            summaries: output_dir.join("posterior_summaries.txt"),
            trace: output_dir.join("change_point_trace.nc"),
            change_points: output_dir.join("change_points.csv"),
            matched_events: output_dir.join("matched_events.csv"),
            trace_plot: figures.join("trace_plots").join("change_point_trace.png"),
            overlay_plot: figures.join("log_returns_change_point.png"),
            manifest: output_dir.join("run_manifest.json"),
        }
    }

    /// Create the output directory tree (idempotent).
    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        for path in [&self.trace_plot, &self.overlay_plot] {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .map_err(|e| AppError::io(format!("Failed to create directory '{}': {e}", dir.display())))?;
            }
        }
        Ok(())
    }
}

/// Write the `Date,LogReturn` file consumed by the returns loader.
pub fn write_returns_csv(path: &Path, series: &ReturnSeries) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    write_row(&mut writer, path, ["Date", "LogReturn"])?;
    for obs in &series.obs {
        write_row(&mut writer, path, [obs.date.to_string(), obs.log_return.to_string()])?;
    }
    flush(writer, path)
}

/// Write the processed price file (`Date,Price,LogReturn`).
pub fn write_prices_csv(path: &Path, rows: &[PriceRow]) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    write_row(&mut writer, path, ["Date", "Price", "LogReturn"])?;
    for row in rows {
        write_row(
            &mut writer,
            path,
            [row.date.to_string(), row.price.to_string(), row.log_return.to_string()],
        )?;
    }
    flush(writer, path)
}

/// One row per breakpoint: its date and the posterior-mode index.
pub fn write_change_points_csv(path: &Path, change_points: &[ChangePointEstimate]) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    write_row(&mut writer, path, ["Date", "Tau_Mode"])?;
    for cp in change_points {
        write_row(&mut writer, path, [cp.date.to_string(), cp.index.to_string()])?;
    }
    flush(writer, path)
}

pub fn write_matched_events_csv(path: &Path, matched: &[MatchedEvent]) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    write_row(
        &mut writer,
        path,
        [
            "Change_Point_Date",
            "Event_Date",
            "Event_Description",
            "Event_Type",
            "Date_Diff_Days",
            "Mean_Before",
            "Mean_After",
            "Impact_Percent",
        ],
    )?;
    for m in matched {
        let impact = m
            .shift
            .impact_percent
            .map(|v| v.to_string())
            .unwrap_or_else(|| IMPACT_NOT_COMPUTABLE.to_string());
        write_row(
            &mut writer,
            path,
            [
                m.change_point.date.to_string(),
                m.event.date.to_string(),
                m.event.description.clone(),
                m.event.event_type.clone(),
                m.date_diff_days.to_string(),
                m.shift.mean_before.to_string(),
                m.shift.mean_after.to_string(),
                impact,
            ],
        )?;
    }
    flush(writer, path)
}

/// Write the fixed-width posterior summary table.
pub fn write_posterior_summaries(path: &Path, summary: &ConvergenceSummary) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create summary file '{}': {e}", path.display())))?;
    file.write_all(format_summary_table(summary).as_bytes())
        .map_err(|e| AppError::io(format!("Failed to write summary file '{}': {e}", path.display())))?;
    Ok(())
}

fn csv_writer(path: &Path) -> Result<csv::Writer<File>, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create CSV '{}': {e}", path.display())))?;
    Ok(csv::Writer::from_writer(file))
}

fn write_row<I, T>(writer: &mut csv::Writer<File>, path: &Path, row: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    writer
        .write_record(row)
        .map_err(|e| AppError::io(format!("Failed to write CSV row to '{}': {e}", path.display())))
}

fn flush(mut writer: csv::Writer<File>, path: &Path) -> Result<(), AppError> {
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush CSV '{}': {e}", path.display())))
}
