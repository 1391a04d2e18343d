//! PNG figures rendered with Plotters' bitmap backend.
//!
//! Charts are built from geometric primitives. Text needs a TrueType font
//! loaded at runtime (`CPD_FONT` or a common system path); without one the
//! figures are drawn unlabelled.
//!
//! - trace plot: one row per parameter; left panel is a per-chain histogram
//!   outline of the marginal posterior, right panel is the per-chain trace
//! - overlay plot: the log-return series against calendar days since the
//!   first observation, with a vertical marker at each estimated change point

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, info, warn};
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};

use crate::domain::{ChangePointEstimate, ReturnSeries};
use crate::error::AppError;
use crate::fit::PosteriorSample;

const HIST_BINS: usize = 40;

/// Per-parameter row height of the trace figure.
const TRACE_ROW_PX: u32 = 160;
const TRACE_WIDTH_PX: u32 = 1200;

const OVERLAY_SIZE: (u32, u32) = (1400, 500);

/// Chain colors (cycled).
const CHAIN_COLORS: [RGBColor; 4] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(148, 103, 189),
];

const MARKER_COLOR: RGBColor = RGBColor(214, 39, 40);
const AXIS_COLOR: RGBColor = RGBColor(160, 160, 160);

const LABEL_FAMILY: &str = "sans-serif";
const LABEL_PX: u32 = 14;

/// Tried in order after `CPD_FONT`.
const SYSTEM_FONTS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
];

type DrawResult = Result<(), Box<dyn Error>>;

/// Whether a label font has been registered with Plotters (checked once).
fn labels_available() -> bool {
    static READY: OnceLock<bool> = OnceLock::new();
    *READY.get_or_init(|| {
        let candidates = font_candidates(std::env::var_os("CPD_FONT").map(PathBuf::from));
        match load_font(&candidates) {
            Some((path, bytes)) if register_label_font(bytes.clone()) => {
                debug!("plot labels use {}", path.display());
                true
            }
            Some((path, _)) => {
                warn!("'{}' is not a usable TrueType font; plots are unlabelled", path.display());
                false
            }
            None => {
                warn!("no label font found (set CPD_FONT); plots are unlabelled");
                false
            }
        }
    })
}

fn font_candidates(explicit: Option<PathBuf>) -> Vec<PathBuf> {
    explicit
        .into_iter()
        .chain(SYSTEM_FONTS.iter().map(PathBuf::from))
        .collect()
}

/// First readable candidate.
fn load_font(candidates: &[PathBuf]) -> Option<(PathBuf, Vec<u8>)> {
    candidates
        .iter()
        .find_map(|path| std::fs::read(path).ok().map(|bytes| (path.clone(), bytes)))
}

/// Plotters keeps registered fonts for the life of the process.
fn register_label_font(bytes: Vec<u8>) -> bool {
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font(LABEL_FAMILY, FontStyle::Normal, bytes).is_ok()
}

/// Posterior diagnostic figure (marginals + traces for every parameter).
pub fn render_trace_plot(path: &Path, posterior: &PosteriorSample) -> Result<(), AppError> {
    draw_trace(path, posterior)
        .map_err(|e| AppError::io(format!("Failed to render trace plot '{}': {e}", path.display())))?;
    info!("wrote trace plot to {}", path.display());
    Ok(())
}

/// Return series with vertical markers at the change-point dates.
pub fn render_overlay_plot(
    path: &Path,
    series: &ReturnSeries,
    change_points: &[ChangePointEstimate],
) -> Result<(), AppError> {
    draw_overlay(path, series, change_points)
        .map_err(|e| AppError::io(format!("Failed to render overlay plot '{}': {e}", path.display())))?;
    info!("wrote change-point overlay plot to {}", path.display());
    Ok(())
}

fn draw_trace(path: &Path, posterior: &PosteriorSample) -> DrawResult {
    let rows = posterior.parameter_names.len().max(1);
    let height = TRACE_ROW_PX * rows as u32;
    let root = BitMapBackend::new(path, (TRACE_WIDTH_PX, height)).into_drawing_area();
    root.fill(&WHITE)?;

    let labelled = labels_available();
    let panels = root.split_evenly((rows, 2));
    for (col, name) in posterior.parameter_names.iter().enumerate() {
        let chains: Vec<Vec<f64>> = (0..posterior.num_chains())
            .map(|c| posterior.chain_values(c, col))
            .collect();
        let label = labelled.then_some(name.as_str());
        draw_marginal(&panels[2 * col], &chains, label)?;
        draw_chain_trace(&panels[2 * col + 1], &chains, label)?;
    }

    root.present()?;
    Ok(())
}

fn draw_marginal<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    chains: &[Vec<f64>],
    label: Option<&str>,
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    let (lo, hi) = value_range(chains.iter().flatten().copied());
    let width = (hi - lo) / HIST_BINS as f64;

    let outlines: Vec<Vec<(f64, f64)>> = chains
        .iter()
        .map(|chain| {
            let mut counts = vec![0usize; HIST_BINS];
            for &v in chain {
                let bin = (((v - lo) / width) as usize).min(HIST_BINS - 1);
                counts[bin] += 1;
            }
            let total = chain.len().max(1) as f64;
            step_outline(&counts, lo, width, total)
        })
        .collect();

    let y_max = outlines
        .iter()
        .flatten()
        .map(|&(_, y)| y)
        .fold(0.0, f64::max)
        .max(1e-12)
        * 1.05;

    let mut chart = panel(area, label).build_cartesian_2d(lo..hi, 0.0..y_max)?;
    draw_frame(&mut chart, lo, hi, 0.0, y_max)?;
    for (c, outline) in outlines.into_iter().enumerate() {
        chart.draw_series(LineSeries::new(outline, &CHAIN_COLORS[c % CHAIN_COLORS.len()]))?;
    }
    Ok(())
}

fn draw_chain_trace<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    chains: &[Vec<f64>],
    label: Option<&str>,
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    let draws = chains.iter().map(Vec::len).max().unwrap_or(0).max(2);
    let (lo, hi) = value_range(chains.iter().flatten().copied());
    let x_max = (draws - 1) as f64;

    let mut chart = panel(area, label).build_cartesian_2d(0.0..x_max, lo..hi)?;
    draw_frame(&mut chart, 0.0, x_max, lo, hi)?;
    for (c, chain) in chains.iter().enumerate() {
        let color = CHAIN_COLORS[c % CHAIN_COLORS.len()].mix(0.7);
        chart.draw_series(LineSeries::new(
            chain.iter().enumerate().map(|(i, &v)| (i as f64, v)),
            &color,
        ))?;
    }
    Ok(())
}

/// Chart area with an optional caption above it.
fn panel<'a, 'b, DB: DrawingBackend>(
    area: &'a DrawingArea<DB, plotters::coord::Shift>,
    label: Option<&str>,
) -> ChartBuilder<'a, 'b, DB> {
    let mut builder = ChartBuilder::on(area);
    builder.margin(8);
    if let Some(label) = label {
        builder.caption(label, (LABEL_FAMILY, LABEL_PX));
    }
    builder
}

fn draw_overlay(path: &Path, series: &ReturnSeries, change_points: &[ChangePointEstimate]) -> DrawResult {
    let root = BitMapBackend::new(path, OVERLAY_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let values = series.values();
    let days = day_offsets(series);
    let x_max = days.last().copied().unwrap_or(0.0).max(1.0);
    let (lo, hi) = value_range(values.iter().copied());

    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if let (true, Some((start, end))) = (labels_available(), series.span()) {
        builder.caption(format!("Log returns, {start} to {end} (x: days)"), (LABEL_FAMILY, LABEL_PX + 4));
    }
    let mut chart = builder.build_cartesian_2d(0.0..x_max, lo..hi)?;
    draw_frame(&mut chart, 0.0, x_max, lo, hi)?;
    if lo < 0.0 && hi > 0.0 {
        chart.draw_series(std::iter::once(PathElement::new(vec![(0.0, 0.0), (x_max, 0.0)], AXIS_COLOR.stroke_width(1))))?;
    }

    chart.draw_series(LineSeries::new(days.iter().copied().zip(values.iter().copied()), &CHAIN_COLORS[0]))?;

    let first = series.span().map(|(start, _)| start);
    chart.draw_series(first.into_iter().flat_map(|start| {
        change_points.iter().map(move |cp| {
            let x = (cp.date - start).num_days() as f64;
            PathElement::new(vec![(x, lo), (x, hi)], MARKER_COLOR.stroke_width(2))
        })
    }))?;

    root.present()?;
    Ok(())
}

/// Plot frame drawn as a rectangle outline.
fn draw_frame<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<plotters::coord::types::RangedCoordf64, plotters::coord::types::RangedCoordf64>>,
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    chart.draw_series(std::iter::once(Rectangle::new([(x0, y0), (x1, y1)], AXIS_COLOR.stroke_width(1))))?;
    Ok(())
}

/// Calendar days since the first observation, one per observation.
fn day_offsets(series: &ReturnSeries) -> Vec<f64> {
    let dates = series.dates();
    match dates.first() {
        Some(&start) => dates.iter().map(|&d| (d - start).num_days() as f64).collect(),
        None => Vec::new(),
    }
}

/// Histogram outline as a density step path.
fn step_outline(counts: &[usize], lo: f64, width: f64, total: f64) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(2 * counts.len() + 2);
    points.push((lo, 0.0));
    for (i, &count) in counts.iter().enumerate() {
        let density = count as f64 / (total * width);
        let left = lo + i as f64 * width;
        points.push((left, density));
        points.push((left + width, density));
    }
    points.push((lo + counts.len() as f64 * width, 0.0));
    points
}

/// Finite `[min, max]`, widened when degenerate.
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (-1.0, 1.0);
    }
    if hi - lo < 1e-12 {
        let pad = lo.abs().max(1.0) * 0.5;
        return (lo - pad, hi + pad);
    }
    let pad = (hi - lo) * 0.02;
    (lo - pad, hi + pad)
}
