use std::collections::BTreeMap;

use crate::store::model::TaskStatus;

/// Share of completed tasks as a percentage, rounded to two decimals.
///
/// Failed tasks do not count as progress; an empty map is `0.0`.
pub fn calculate_progress(tasks: &BTreeMap<String, TaskStatus>) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    let completed = tasks
        .values()
        .filter(|s| **s == TaskStatus::Completed)
        .count();
    round_to(completed as f64 / tasks.len() as f64 * 100.0, 2)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
