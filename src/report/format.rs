//! Formatted terminal / text output.
//!
//! We keep formatting code in one place so:
//! - the sampling and analysis code stays clean and testable
//! - output changes are localized

use crate::analysis::PosteriorAnalysis;
use crate::domain::{MatchedEvent, RegimeShift, RunConfig};
use crate::io::ArtifactPaths;

/// Header of the run (inputs, model size, sampler settings, convergence).
pub fn format_run_summary(config: &RunConfig, observations: usize, events: usize, analysis: &PosteriorAnalysis) -> String {
    let mut out = String::new();

    out.push_str("=== cpd - Bayesian change-point detection ===\n");
    out.push_str(&format!("Returns: {} (n={observations})\n", config.returns_path.display()));
    out.push_str(&format!("Events : {} ({events} events)\n", config.events_path.display()));
    out.push_str(&format!(
        "Model  : k={} change point(s), {} regimes\n",
        config.change_points.k(),
        config.change_points.regimes()
    ));
    out.push_str(&format!(
        "Sampler: chains={} draws={} tune={} seed={}\n",
        config.sampler.chains, config.sampler.draws, config.sampler.tune, config.sampler.seed
    ));

    let status = if analysis.convergence.converged() {
        "converged"
    } else {
        "WARNING: may not have converged, check trace plots"
    };
    out.push_str(&format!("max r_hat = {:.2} ({status})\n", analysis.convergence.max_r_hat));

    out.push_str("\nRegime means:\n");
    for (i, m) in analysis.regime_means.iter().enumerate() {
        out.push_str(&format!("- mu_{}: {m:.6}\n", i + 1));
    }

    out
}

/// Per change point: the matched event and the regime shift across it.
pub fn format_matches(matched: &[MatchedEvent]) -> String {
    let mut out = String::new();
    for (i, m) in matched.iter().enumerate() {
        out.push_str(&format!("\nChange Point {} Date: {}\n", i + 1, m.change_point.date));
        out.push_str(&format!("Closest Event: {} on {}\n", m.event.description, m.event.date));
        out.push_str(&format!("Date Difference: {} days\n", m.date_diff_days));
        out.push_str(&format!("Mean Log Return Before: {:.6}\n", m.shift.mean_before));
        out.push_str(&format!("Mean Log Return After: {:.6}\n", m.shift.mean_after));
        out.push_str(&format!("Impact: {}\n", fmt_impact(&m.shift)));
    }
    out
}

pub fn format_artifacts(paths: &ArtifactPaths, plots: bool) -> String {
    let mut out = String::from("\nArtifacts:\n");
    let mut files = vec![&paths.summaries, &paths.trace, &paths.change_points, &paths.matched_events];
    if plots {
        files.push(&paths.trace_plot);
        files.push(&paths.overlay_plot);
    }
    files.push(&paths.manifest);
    for f in files {
        out.push_str(&format!("- {}\n", f.display()));
    }
    out
}

/// Fixed-width per-parameter summary table.
pub fn format_summary_table(summary: &crate::domain::ConvergenceSummary) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<10} {:>12} {:>12} {:>12} {:>12} {:>10} {:>8}",
            "", "mean", "sd", "hdi_3%", "hdi_97%", "ess", "r_hat"
        )
        .trim_end(),
    );
    out.push('\n');

    for p in &summary.parameters {
        out.push_str(&format!(
            "{:<10} {:>12} {:>12} {:>12} {:>12} {:>10.1} {:>8.2}\n",
            truncate(&p.name, 10),
            fmt_num(p.mean),
            fmt_num(p.sd),
            fmt_num(p.hdi_low),
            fmt_num(p.hdi_high),
            p.ess,
            p.r_hat
        ));
    }
    out
}

fn fmt_impact(shift: &RegimeShift) -> String {
    match shift.impact_percent {
        Some(v) => format!("{v:.2}% change in mean log return"),
        None => "Not calculated (Mean_Before ≈ 0)".to_string(),
    }
}

/// Breakpoint-sized values read better with fewer decimals.
fn fmt_num(v: f64) -> String {
    if v.abs() >= 1.0 {
        format!("{v:.3}")
    } else {
        format!("{v:.6}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ChangePointEstimate, ConvergenceStatus, ConvergenceSummary, EventRecord, ParameterSummary,
    };
    use chrono::NaiveDate;

    fn matched(impact: Option<f64>) -> MatchedEvent {
        MatchedEvent {
            change_point: ChangePointEstimate {
                date: NaiveDate::from_ymd_opt(2020, 1, 10).unwrap(),
                index: 7,
            },
            event: EventRecord {
                date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                description: "Outbreak".to_string(),
                event_type: "Health".to_string(),
            },
            date_diff_days: 9,
            shift: RegimeShift {
                mean_before: -0.02,
                mean_after: -0.01,
                impact_percent: impact,
            },
        }
    }

    #[test]
    fn matches_report_impact_or_fallback() {
        let text = format_matches(&[matched(Some(50.0)), matched(None)]);
        assert!(text.contains("Change Point 1 Date: 2020-01-10"));
        assert!(text.contains("Closest Event: Outbreak on 2020-01-01"));
        assert!(text.contains("Date Difference: 9 days"));
        assert!(text.contains("Mean Log Return Before: -0.020000"));
        assert!(text.contains("Impact: 50.00% change in mean log return"));
        assert!(text.contains("Change Point 2 Date"));
        assert!(text.contains("Impact: Not calculated (Mean_Before ≈ 0)"));
    }

    #[test]
    fn summary_table_has_one_row_per_parameter() {
        let summary = ConvergenceSummary {
            parameters: ["tau", "mu_1", "sigma_1"]
                .iter()
                .map(|name| ParameterSummary {
                    name: name.to_string(),
                    mean: 0.5,
                    sd: 0.1,
                    hdi_low: 0.3,
                    hdi_high: 0.7,
                    ess: 1234.5,
                    r_hat: 1.0,
                })
                .collect(),
            max_r_hat: 1.0,
            status: ConvergenceStatus::Converged,
        };

        let table = format_summary_table(&summary);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("hdi_3%") && lines[0].ends_with("r_hat"));
        assert!(lines[2].starts_with("mu_1"));
        assert!(lines[3].contains("1234.5"));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("sigma_1", 10), "sigma_1");
        assert_eq!(truncate("a_very_long_name", 6), "a_ver.");
    }
}
