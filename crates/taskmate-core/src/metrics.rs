use serde::Serialize;
use tracing::debug;

use crate::record::{FocusSession, Priority, Task};

const SCORE_PER_COMPLETED_TASK: f64 = 5.0;
const SCORE_PER_COMPLETED_SESSION: f64 = 3.0;
const SCORE_PER_FOCUS_MINUTE: f64 = 0.5;
const SCORE_CEILING: f64 = 100.0;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Metrics {
    pub completed_count: u64,
    pub total_count: u64,
    pub completion_rate_percent: u8,
    pub total_focus_seconds: u64,
    pub session_count: u64,
    pub completed_session_count: u64,
    pub average_focus_minutes: f64,
    /// `None` when there are no sessions to rate.
    pub session_completion_rate_percent: Option<u8>,
    pub pending_high_priority_count: u64,
    pub productivity_score: u8,
}

/// Derives the scalar statistics for a report.
///
/// `tasks` is the created-in-range view and `sessions` the started-in-range
/// view. Rates over an empty denominator are zero.
#[tracing::instrument(skip_all, fields(tasks = tasks.len(), sessions = sessions.len()))]
pub fn compute_metrics(tasks: &[&Task], sessions: &[&FocusSession]) -> Metrics {
    let total_count = tasks.len() as u64;
    let completed_count = tasks.iter().filter(|task| task.is_done()).count() as u64;
    let pending_high_priority_count = tasks
        .iter()
        .filter(|task| !task.is_done() && task.priority == Some(Priority::High))
        .count() as u64;

    let session_count = sessions.len() as u64;
    let completed_session_count = sessions.iter().filter(|s| s.completed).count() as u64;
    let total_focus_seconds: u64 = sessions.iter().map(|s| s.duration_seconds).sum();
    let average_focus_minutes = if session_count > 0 {
        total_focus_seconds as f64 / session_count as f64 / 60.0
    } else {
        0.0
    };
    let session_completion_rate_percent =
        (session_count > 0).then(|| percent(completed_session_count, session_count));

    let metrics = Metrics {
        completed_count,
        total_count,
        completion_rate_percent: percent(completed_count, total_count),
        total_focus_seconds,
        session_count,
        completed_session_count,
        average_focus_minutes,
        session_completion_rate_percent,
        pending_high_priority_count,
        productivity_score: productivity_score(
            completed_count,
            completed_session_count,
            average_focus_minutes,
        ),
    };
    debug!(?metrics, "computed metrics");
    metrics
}

/// Weighted heuristic: five points per completed task, three per completed
/// session, half a point per average focus minute, clamped to 0..=100.
/// The weights are arbitrary and carry no statistical meaning.
pub fn productivity_score(
    completed_tasks: u64,
    completed_sessions: u64,
    average_focus_minutes: f64,
) -> u8 {
    let raw = completed_tasks as f64 * SCORE_PER_COMPLETED_TASK
        + completed_sessions as f64 * SCORE_PER_COMPLETED_SESSION
        + average_focus_minutes * SCORE_PER_FOCUS_MINUTE;
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, SCORE_CEILING) as u8
}

/// `round(part / whole * 100)`, zero for an empty whole.
pub fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let ratio = part.min(whole) as f64 / whole as f64;
    (ratio * 100.0).round() as u8
}
