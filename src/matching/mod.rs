//! Pair each estimated change point with the temporally nearest catalog event.

use log::debug;

use crate::domain::{ChangePointEstimate, EventCatalog, EventRecord, MatchedEvent, RegimeShift};
use crate::error::AppError;

/// Match every change point to its closest event.
///
/// `shifts[j]` is the regime shift across change point `j`. Ties in day
/// distance go to the earliest event (the catalog is sorted ascending).
pub fn match_events(
    change_points: &[ChangePointEstimate],
    shifts: &[RegimeShift],
    catalog: &EventCatalog,
) -> Result<Vec<MatchedEvent>, AppError> {
    if change_points.len() != shifts.len() {
        return Err(AppError::model(format!(
            "Got {} change points but {} regime shifts.",
            change_points.len(),
            shifts.len()
        )));
    }

    change_points
        .iter()
        .zip(shifts)
        .map(|(cp, shift)| {
            let (event, diff) = nearest_event(catalog, cp)
                .ok_or_else(|| AppError::data_format("Event catalog is empty; nothing to match against."))?;
            debug!("change point {} -> event {} ({diff} days)", cp.date, event.date);
            Ok(MatchedEvent {
                change_point: *cp,
                event: event.clone(),
                date_diff_days: diff,
                shift: *shift,
            })
        })
        .collect()
}

/// Closest event and its absolute distance in days.
pub fn nearest_event<'a>(catalog: &'a EventCatalog, cp: &ChangePointEstimate) -> Option<(&'a EventRecord, i64)> {
    let mut best: Option<(&EventRecord, i64)> = None;
    for event in &catalog.events {
        let diff = (event.date - cp.date).num_days().abs();
        if best.is_none_or(|(_, d)| diff < d) {
            best = Some((event, diff));
        }
    }
    best
}
