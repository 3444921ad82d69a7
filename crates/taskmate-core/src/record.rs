use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::datetime::lenient_timestamp;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "To Do", alias = "ToDo")]
    ToDo,
    #[serde(rename = "In Progress", alias = "InProgress")]
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub list: Option<String>,

    #[serde(default, deserialize_with = "lenient::priority")]
    pub priority: Option<Priority>,

    #[serde(default, deserialize_with = "lenient::status")]
    pub status: TaskStatus,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub completed: bool,

    #[serde(default, with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            list: None,
            priority: None,
            status: TaskStatus::ToDo,
            completed: false,
            created_at: Some(created_at),
            completed_at: None,
        }
    }

    /// Canonical completion signal.
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Priority with the backend's default applied.
    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or(Priority::Medium)
    }

    /// Reconciles `completed` and `status` after ingest. A task counts as done
    /// when either field says so. Returns true when the record was changed.
    pub fn normalize(&mut self) -> bool {
        let done = self.completed || self.status == TaskStatus::Done;
        let changed = done != self.completed || done != self.is_done();
        if changed {
            debug!(
                id = %self.id,
                completed = self.completed,
                status = ?self.status,
                "reconciled task completion signals"
            );
        }
        if done {
            self.status = TaskStatus::Done;
        }
        self.completed = done;
        changed
    }

    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed = status == TaskStatus::Done;
        if self.completed {
            self.completed_at.get_or_insert(now);
        } else {
            self.completed_at = None;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,

    #[serde(default)]
    pub task_id: Option<String>,

    #[serde(default)]
    pub task_title: String,

    #[serde(default, deserialize_with = "lenient::seconds")]
    pub duration_seconds: u64,

    #[serde(default, with = "lenient_timestamp")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub completed: bool,

    #[serde(default)]
    pub date: String,
}

impl FocusSession {
    pub fn new(
        task_id: Option<String>,
        task_title: String,
        duration_seconds: u64,
        started_at: DateTime<Utc>,
        completed: bool,
        day: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            task_title,
            duration_seconds,
            started_at: Some(started_at),
            completed,
            date: day.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }
}

/// Field decoders for backend documents. A value of the wrong shape is
/// logged and read as absent instead of rejecting the whole record.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use tracing::warn;

    use super::{Priority, TaskStatus};

    pub fn priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(|value| {
            let parsed = value.as_str().and_then(|label| {
                match label.trim().to_ascii_lowercase().as_str() {
                    "low" => Some(Priority::Low),
                    "medium" => Some(Priority::Medium),
                    "high" => Some(Priority::High),
                    _ => None,
                }
            });
            if parsed.is_none() && !value.is_null() {
                warn!(value = %value, "ignoring unknown priority");
            }
            parsed
        }))
    }

    pub fn status<'de, D>(deserializer: D) -> Result<TaskStatus, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        let Some(value) = raw.filter(|value| !value.is_null()) else {
            return Ok(TaskStatus::default());
        };
        let label = value
            .as_str()
            .map(|label| label.trim().to_ascii_lowercase().replace([' ', '_', '-'], ""));
        Ok(match label.as_deref() {
            Some("todo") => TaskStatus::ToDo,
            Some("inprogress") => TaskStatus::InProgress,
            Some("done") => TaskStatus::Done,
            _ => {
                warn!(value = %value, "unknown task status; treating as To Do");
                TaskStatus::default()
            }
        })
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                warn!(value = %other, "ignoring non-boolean completion flag");
                false
            }
        })
    }

    /// Whole non-negative seconds; fractions are truncated.
    pub fn seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        let Some(value) = raw.filter(|value| !value.is_null()) else {
            return Ok(0);
        };
        let parsed = value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| secs as u64)
        });
        Ok(parsed.unwrap_or_else(|| {
            warn!(value = %value, "ignoring invalid session duration");
            0
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{FocusSession, Priority, Task, TaskStatus};

    #[test]
    fn deserializes_backend_document_shape() {
        let raw = r#"{
            "id": "t1",
            "title": "Project Proposal",
            "list": "Work",
            "priority": "High",
            "status": "In Progress",
            "createdAt": "2026-02-17T09:30:00Z"
        }"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, Some(Priority::High));
        assert!(!task.completed);
        assert_eq!(
            task.created_at,
            Utc.with_ymd_and_hms(2026, 2, 17, 9, 30, 0).single()
        );
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn malformed_timestamp_becomes_absent() {
        let raw = r#"{"id": "t2", "status": "Done", "createdAt": "yesterday-ish"}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.created_at, None);
        assert!(task.is_done());
    }

    #[test]
    fn normalize_trusts_either_completion_signal() {
        let now = Utc::now();
        let mut flagged = Task::new("a", "flagged", now);
        flagged.completed = true;
        assert!(flagged.normalize());
        assert_eq!(flagged.status, TaskStatus::Done);

        let mut status_only = Task::new("b", "status only", now);
        status_only.status = TaskStatus::Done;
        assert!(status_only.normalize());
        assert!(status_only.completed);

        let mut untouched = Task::new("c", "open", now);
        assert!(!untouched.normalize());
        assert!(!untouched.is_done());
    }

    #[test]
    fn set_status_keeps_completion_in_sync() {
        let now = Utc::now();
        let mut task = Task::new("a", "toggle", now);
        task.set_status(TaskStatus::Done, now);
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(now));

        task.set_status(TaskStatus::ToDo, now);
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn session_day_parses_calendar_string() {
        let started = Utc
            .with_ymd_and_hms(2026, 2, 17, 9, 0, 0)
            .single()
            .expect("valid start");
        let session = FocusSession::new(
            None,
            "Deep work".to_string(),
            1500,
            started,
            true,
            started.date_naive(),
        );
        assert_eq!(session.date, "2026-02-17");
        assert_eq!(session.day(), Some(started.date_naive()));
        assert_eq!(Priority::High.to_string(), "High");
    }

    #[test]
    fn odd_field_values_are_absorbed() {
        let raw = r#"{"id": "t3", "priority": "urgent", "status": "archived", "completed": "yes"}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.priority, None);
        assert_eq!(task.effective_priority(), Priority::Medium);
        assert_eq!(task.status, TaskStatus::ToDo);
        assert!(!task.completed);

        let raw = r#"{"id": "t4", "priority": "high", "status": "done", "completed": null}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.priority, Some(Priority::High));
        assert!(task.is_done());

        let raw = r#"{"id": "s1", "durationSeconds": -90, "completed": true}"#;
        let session: FocusSession = serde_json::from_str(raw).expect("parse session");
        assert_eq!(session.duration_seconds, 0);
        assert!(session.completed);

        let raw = r#"{"id": "s2", "durationSeconds": 1500.7}"#;
        let session: FocusSession = serde_json::from_str(raw).expect("parse session");
        assert_eq!(session.duration_seconds, 1500);
    }

    #[test]
    fn stored_form_reads_back() {
        let now = Utc::now();
        let mut task = Task::new("a", "round", now);
        task.priority = Some(Priority::Low);
        task.status = TaskStatus::InProgress;
        let json = serde_json::to_string(&task).expect("serialize");
        assert!(json.contains(r#""status":"In Progress""#));
        let back: Task = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.priority, Some(Priority::Low));
        assert_eq!(back.status, TaskStatus::InProgress);
    }
}
