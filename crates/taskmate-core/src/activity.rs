use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::local_date;
use crate::filter::RecordViews;
use crate::record::{FocusSession, Priority};

const PER_KIND_LIMIT: usize = 5;
const FEED_LIMIT: usize = 10;

const TIME_AGO_UNITS: [(&str, i64); 6] = [
    ("year", 31_536_000),
    ("month", 2_592_000),
    ("week", 604_800),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
];

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Task,
    Focus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityItem {
    pub kind: ActivityKind,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub time_ago: String,
    pub priority: Option<Priority>,
    pub duration_minutes: Option<u64>,
}

/// Newest-first feed of completed tasks and focus sessions.
///
/// Takes the five most recent of each kind from the period views, then keeps
/// the ten newest overall.
pub fn recent_activity(views: &RecordViews<'_>, now: DateTime<Utc>) -> Vec<ActivityItem> {
    let mut tasks: Vec<ActivityItem> = views
        .created
        .iter()
        .filter(|task| task.is_done())
        .filter_map(|task| {
            let completed_at = task.completed_at?;
            Some(ActivityItem {
                kind: ActivityKind::Task,
                title: task.title.clone(),
                timestamp: completed_at,
                time_ago: time_ago(completed_at, now),
                priority: Some(task.effective_priority()),
                duration_minutes: None,
            })
        })
        .collect();
    newest_first(&mut tasks);
    tasks.truncate(PER_KIND_LIMIT);

    let mut sessions: Vec<ActivityItem> = views
        .sessions
        .iter()
        .filter_map(|session| {
            let started_at = session.started_at?;
            let title = if session.task_title.trim().is_empty() {
                "Untitled"
            } else {
                session.task_title.as_str()
            };
            Some(ActivityItem {
                kind: ActivityKind::Focus,
                title: format!("Focus session: {title}"),
                timestamp: started_at,
                time_ago: time_ago(started_at, now),
                priority: None,
                duration_minutes: Some(session.duration_seconds / 60),
            })
        })
        .collect();
    newest_first(&mut sessions);
    sessions.truncate(PER_KIND_LIMIT);

    let mut feed = tasks;
    feed.extend(sessions);
    newest_first(&mut feed);
    feed.truncate(FEED_LIMIT);
    feed
}

/// Coarse relative label such as `3 days ago`; anything under a minute,
/// or in the future, is `Just now`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    for (unit, unit_seconds) in TIME_AGO_UNITS {
        let count = seconds / unit_seconds;
        if count >= 1 {
            let plural = if count > 1 { "s" } else { "" };
            return format!("{count} {unit}{plural} ago");
        }
    }
    "Just now".to_string()
}

fn newest_first(items: &mut [ActivityItem]) {
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TodaySummary {
    pub total_seconds: u64,
    pub completed_sessions: usize,
    pub total_sessions: usize,
}

impl TodaySummary {
    /// `Xh Ym`, or just `Ym` under an hour.
    pub fn total_label(&self) -> String {
        let hours = self.total_seconds / 3600;
        let minutes = (self.total_seconds % 3600) / 60;
        if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }
}

/// Focus totals for the local day containing `now`. Sessions are matched on
/// their recorded `date`, falling back to the local day of `started_at`.
pub fn today_summary(sessions: &[FocusSession], now: DateTime<Utc>, tz: &Tz) -> TodaySummary {
    let today = local_date(now, tz);
    sessions
        .iter()
        .filter(|session| {
            session
                .day()
                .or_else(|| session.started_at.map(|at| local_date(at, tz)))
                == Some(today)
        })
        .fold(TodaySummary::default(), |mut summary, session| {
            summary.total_seconds += session.duration_seconds;
            summary.total_sessions += 1;
            if session.completed {
                summary.completed_sessions += 1;
            }
            summary
        })
}
