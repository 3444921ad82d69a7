//! Period views over raw records.
//!
//! Every view selects by exactly one
//! timestamp field and drops records
//! where that field is absent.

use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  trace
};

use crate::period::DateRange;
use crate::record::{
  FocusSession,
  Task
};

/// Which timestamp a view selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
  Created,
  Completed
}

impl TaskField {
  pub fn timestamp(
    &self,
    task: &Task
  ) -> Option<DateTime<Utc>> {
    match self {
      | Self::Created => task.created_at,
      | Self::Completed => {
        if task.is_done() {
          task.completed_at
        } else {
          None
        }
      }
    }
  }
}

/// The filtered record sets a report is
/// computed from.
#[derive(Debug, Clone, Default)]
pub struct RecordViews<'a> {
  /// Tasks created inside the range.
  pub created:   Vec<&'a Task>,
  /// Done tasks completed inside the
  /// range.
  pub completed: Vec<&'a Task>,
  /// Sessions started inside the range.
  pub sessions:  Vec<&'a FocusSession>
}

impl<'a> RecordViews<'a> {
  #[tracing::instrument(skip_all)]
  pub fn select(
    tasks: &'a [Task],
    sessions: &'a [FocusSession],
    range: &DateRange
  ) -> Self {
    let views = Self {
      created:   tasks_in(
        tasks,
        range,
        TaskField::Created
      ),
      completed: tasks_in(
        tasks,
        range,
        TaskField::Completed
      ),
      sessions:  sessions_started_in(
        sessions, range
      )
    };
    debug!(
      tasks = tasks.len(),
      sessions = sessions.len(),
      created = views.created.len(),
      completed = views.completed.len(),
      started = views.sessions.len(),
      "selected record views"
    );
    views
  }
}

pub fn tasks_created_in<'a>(
  tasks: &'a [Task],
  range: &DateRange
) -> Vec<&'a Task> {
  tasks_in(tasks, range, TaskField::Created)
}

pub fn tasks_completed_in<'a>(
  tasks: &'a [Task],
  range: &DateRange
) -> Vec<&'a Task> {
  tasks_in(
    tasks,
    range,
    TaskField::Completed
  )
}

pub fn sessions_started_in<'a>(
  sessions: &'a [FocusSession],
  range: &DateRange
) -> Vec<&'a FocusSession> {
  sessions
    .iter()
    .filter(|session| {
      match session.started_at {
        | Some(started) => {
          range.contains(started)
        }
        | None => {
          trace!(
            id = %session.id,
            "session without start time excluded"
          );
          false
        }
      }
    })
    .collect()
}

fn tasks_in<'a>(
  tasks: &'a [Task],
  range: &DateRange,
  field: TaskField
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      if let (Some(created), Some(done)) =
        (task.created_at, task.completed_at)
        && done < created
      {
        debug!(
          id = %task.id,
          created = %created,
          completed = %done,
          "task completed before it was created"
        );
      }

      match field.timestamp(task) {
        | Some(ts) => range.contains(ts),
        | None => {
          trace!(
            id = %task.id,
            field = ?field,
            "task without timestamp excluded"
          );
          false
        }
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    TimeZone,
    Utc
  };

  use super::{
    RecordViews,
    sessions_started_in,
    tasks_completed_in,
    tasks_created_in
  };
  use crate::period::DateRange;
  use crate::record::{
    FocusSession,
    Task,
    TaskStatus
  };

  fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(2026, 2, d, h, 0, 0)
      .single()
      .expect("valid instant")
  }

  fn range() -> DateRange {
    DateRange::new(at(10, 0), at(17, 12))
  }

  #[test]
  fn created_view_is_inclusive_and_drops_missing()
  {
    let mut undated = Task::new("u", "undated", at(12, 0));
    undated.created_at = None;
    let tasks = vec![
      Task::new("a", "edge start", at(10, 0)),
      Task::new("b", "edge end", at(17, 12)),
      Task::new("c", "before", at(9, 23)),
      undated
    ];
    let ids: Vec<&str> =
      tasks_created_in(&tasks, &range())
        .into_iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
  }

  #[test]
  fn completed_view_needs_done_status() {
    let mut done = Task::new("done", "done", at(1, 0));
    done.set_status(TaskStatus::Done, at(12, 0));
    let mut reopened =
      Task::new("reopened", "reopened", at(1, 0));
    reopened.completed_at = Some(at(12, 0));
    let tasks = vec![done, reopened];

    let completed =
      tasks_completed_in(&tasks, &range());
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, "done");
    assert!(
      tasks_created_in(&tasks, &range())
        .is_empty()
    );
  }

  #[test]
  fn completion_before_creation_does_not_fail()
  {
    let mut anomaly =
      Task::new("x", "time travel", at(15, 0));
    anomaly.set_status(TaskStatus::Done, at(5, 0));
    anomaly.completed_at = Some(at(5, 0));
    let tasks = vec![anomaly];
    let views = RecordViews::select(
      &tasks,
      &[],
      &range()
    );
    assert_eq!(views.created.len(), 1);
    assert!(views.completed.is_empty());
  }

  #[test]
  fn sessions_without_start_are_excluded() {
    let mut started = FocusSession::new(
      None,
      "write".to_string(),
      600,
      at(11, 8),
      true,
      at(11, 8).date_naive()
    );
    let mut missing = started.clone();
    missing.started_at = None;
    started.id = "kept".to_string();
    let sessions = vec![started, missing];
    let kept =
      sessions_started_in(&sessions, &range());
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, "kept");
  }
}
