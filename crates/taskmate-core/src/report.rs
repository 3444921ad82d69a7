use std::borrow::Cow;

use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{
  debug,
  error,
  info
};

use crate::activity::{
  ActivityItem,
  recent_activity
};
use crate::datetime::format_hours_minutes;
use crate::filter::RecordViews;
use crate::insights::{
  Insight,
  generate_insights
};
use crate::metrics::{
  Metrics,
  compute_metrics
};
use crate::period::{
  DateRange,
  Period,
  resolve_date_range
};
use crate::record::{
  FocusSession,
  Task
};
use crate::series::{
  Breakdown,
  BucketValue,
  Series,
  build_daily_series,
  category_breakdown,
  priority_breakdown
};
use crate::source::RecordSource;

/// Clock and timezone a report is
/// computed against. Owned by the
/// caller; nothing here is global.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext {
  pub now: DateTime<Utc>,
  pub tz:  Tz
}

impl ReportContext {
  pub fn new(
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    Self {
      now,
      tz
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSeries {
  pub completion_trend:   Series,
  pub focus_time:         Series,
  pub priority_breakdown: Breakdown,
  pub category_breakdown: Breakdown
}

#[derive(Debug, Clone, Serialize)]
pub struct Trends {
  pub completion:   &'static str,
  pub productivity: &'static str,
  pub total_focus:  String
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
  pub period:   Period,
  pub range:    DateRange,
  pub metrics:  Metrics,
  pub series:   ReportSeries,
  pub insights: Vec<Insight>,
  pub activity: Vec<ActivityItem>,
  pub trends:   Trends
}

/// Result of [`fetch_report`]. On a
/// fetch failure `report` is the empty
/// report for the period and `error`
/// carries the cause.
#[derive(Debug)]
pub struct ReportOutcome {
  pub report: Report,
  pub error:  Option<anyhow::Error>
}

#[tracing::instrument(skip(tasks, sessions, ctx), fields(period = %period))]
pub fn compute_report(
  period: Period,
  tasks: &[Task],
  sessions: &[FocusSession],
  ctx: &ReportContext
) -> Report {
  let tasks = normalized(tasks);
  let range = resolve_date_range(
    period, ctx.now, &ctx.tz
  );
  let views = RecordViews::select(
    &tasks, sessions, &range
  );

  let metrics = compute_metrics(
    &views.created,
    &views.sessions
  );
  let series = ReportSeries {
    completion_trend:   build_daily_series(
      &range,
      &ctx.tz,
      &views.completed,
      |task| task.completed_at,
      BucketValue::Count
    ),
    focus_time:         build_daily_series(
      &range,
      &ctx.tz,
      &views.sessions,
      |session| session.started_at,
      BucketValue::Sum(&focus_minutes)
    ),
    priority_breakdown: priority_breakdown(
      &views.created
    ),
    category_breakdown: category_breakdown(
      &views.created
    )
  };
  let insights =
    generate_insights(&metrics);
  let activity =
    recent_activity(&views, ctx.now);
  let trends = Trends {
    completion:   completion_label(
      metrics.completion_rate_percent
    ),
    productivity: productivity_label(
      metrics.productivity_score
    ),
    total_focus:  format_hours_minutes(
      metrics.total_focus_seconds
    )
  };

  info!(
    completed = metrics.completed_count,
    total = metrics.total_count,
    score = metrics.productivity_score,
    insights = insights.len(),
    "computed report"
  );

  Report {
    period,
    range,
    metrics,
    series,
    insights,
    activity,
    trends
  }
}

/// Report over no records.
pub fn empty_report(
  period: Period,
  ctx: &ReportContext
) -> Report {
  compute_report(period, &[], &[], ctx)
}

/// Fetches tasks and sessions
/// concurrently, then computes the
/// report. A failed fetch yields the
/// empty report plus the error; nothing
/// stale is reused.
#[tracing::instrument(skip(source, ctx), fields(period = %period))]
pub async fn fetch_report<S>(
  source: &S,
  period: Period,
  ctx: &ReportContext
) -> ReportOutcome
where
  S: RecordSource
{
  let (tasks, sessions) = tokio::join!(
    source.fetch_tasks(),
    source.fetch_sessions()
  );

  match (tasks, sessions) {
    | (Ok(tasks), Ok(sessions)) => {
      debug!(
        tasks = tasks.len(),
        sessions = sessions.len(),
        "fetched records"
      );
      ReportOutcome {
        report: compute_report(
          period, &tasks, &sessions, ctx
        ),
        error:  None
      }
    }
    | (Err(err), _) | (_, Err(err)) => {
      error!(
        error = %format!("{err:#}"),
        "record fetch failed; returning empty report"
      );
      ReportOutcome {
        report: empty_report(period, ctx),
        error:  Some(err)
      }
    }
  }
}

pub fn completion_label(
  rate: u8
) -> &'static str {
  if rate >= 70 {
    "Excellent!"
  } else if rate >= 50 {
    "Good progress"
  } else {
    "Keep going!"
  }
}

pub fn productivity_label(
  score: u8
) -> &'static str {
  if score >= 70 {
    "High productivity"
  } else if score >= 40 {
    "Steady progress"
  } else {
    "Building momentum"
  }
}

fn focus_minutes(
  session: &&FocusSession
) -> f64 {
  session.duration_seconds as f64 / 60.0
}

fn normalized(
  tasks: &[Task]
) -> Cow<'_, [Task]> {
  let consistent = tasks.iter().all(
    |task| task.completed == task.is_done()
  );
  if consistent {
    return Cow::Borrowed(tasks);
  }

  let mut owned = tasks.to_vec();
  let changed = owned
    .iter_mut()
    .map(Task::normalize)
    .filter(|changed| *changed)
    .count();
  debug!(changed, "normalized task completion signals");
  Cow::Owned(owned)
}

#[cfg(test)]
mod tests {
  use anyhow::anyhow;
  use chrono::{
    DateTime,
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    ReportContext,
    compute_report,
    fetch_report
  };
  use crate::insights::InsightKind;
  use crate::period::Period;
  use crate::record::{
    FocusSession,
    Task,
    TaskStatus
  };
  use crate::source::RecordSource;

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn ctx() -> ReportContext {
    ReportContext::new(
      now(),
      chrono_tz::UTC
    )
  }

  fn session(
    seconds: u64,
    started: DateTime<Utc>
  ) -> FocusSession {
    FocusSession::new(
      None,
      "deep work".to_string(),
      seconds,
      started,
      true,
      started.date_naive()
    )
  }

  #[test]
  fn empty_today_report() {
    let report = compute_report(
      Period::Today,
      &[],
      &[],
      &ctx()
    );
    assert_eq!(
      report.metrics.completion_rate_percent,
      0
    );
    assert_eq!(
      report.metrics.productivity_score,
      0
    );
    assert!(
      !report.series.completion_trend.has_data
    );
    assert!(
      !report.series.focus_time.has_data
    );
    assert!(
      !report
        .series
        .priority_breakdown
        .has_data
    );
    assert!(
      !report
        .series
        .category_breakdown
        .has_data
    );
    let kinds: Vec<InsightKind> = report
      .insights
      .iter()
      .map(|i| i.kind)
      .collect();
    assert_eq!(
      kinds,
      vec![
        InsightKind::GetStarted,
        InsightKind::TrackProgress,
        InsightKind::StayFocused
      ]
    );
    assert!(report.activity.is_empty());
    assert_eq!(
      report.trends.total_focus,
      "0h 0m"
    );
  }

  #[test]
  fn ten_tasks_eight_done_all_time() {
    let created = now() - Duration::days(30);
    let tasks: Vec<Task> = (0..10)
      .map(|i| {
        let mut task = Task::new(
          format!("t{i}"),
          "task",
          created
        );
        if i < 8 {
          task.status = TaskStatus::Done;
        }
        task
      })
      .collect();
    let report = compute_report(
      Period::All,
      &tasks,
      &[],
      &ctx()
    );
    assert_eq!(
      report.metrics.completion_rate_percent,
      80
    );
    let kinds: Vec<InsightKind> = report
      .insights
      .iter()
      .map(|i| i.kind)
      .collect();
    assert!(
      kinds.contains(&InsightKind::GoodProgress)
    );
    assert!(!kinds.contains(
      &InsightKind::OutstandingPerformance
    ));
    assert_eq!(
      report.trends.completion,
      "Excellent!"
    );
  }

  #[test]
  fn just_over_half_done_is_good_progress() {
    let created = now() - Duration::days(3);
    let tasks: Vec<Task> = (0..125)
      .map(|i| {
        let mut task = Task::new(
          format!("t{i}"),
          "task",
          created
        );
        if i < 63 {
          task.status = TaskStatus::Done;
        }
        task
      })
      .collect();
    let report = compute_report(
      Period::All,
      &tasks,
      &[],
      &ctx()
    );
    assert_eq!(
      report.metrics.completion_rate_percent,
      50
    );
    let kinds: Vec<InsightKind> = report
      .insights
      .iter()
      .map(|i| i.kind)
      .collect();
    assert_eq!(
      kinds,
      vec![InsightKind::GoodProgress]
    );
  }

  #[test]
  fn long_sessions_earn_excellent_focus() {
    let sessions = vec![
      session(1800, now() - Duration::hours(1)),
      session(2700, now() - Duration::hours(3)),
      session(3600, now() - Duration::days(1))
    ];
    let report = compute_report(
      Period::Week,
      &[],
      &sessions,
      &ctx()
    );
    assert_eq!(
      report.metrics.total_focus_seconds,
      8100
    );
    assert_eq!(
      report.metrics.average_focus_minutes,
      45.0
    );
    assert!(report.insights.iter().any(
      |i| i.kind == InsightKind::ExcellentFocus
    ));
    assert!(report.series.focus_time.has_data);
    let last = report
      .series
      .focus_time
      .buckets
      .last()
      .expect("today bucket");
    assert_eq!(last.value, 75.0);
    assert_eq!(
      report.trends.total_focus,
      "2h 15m"
    );
  }

  #[test]
  fn completed_flag_alone_counts_as_done() {
    let mut legacy = Task::new(
      "legacy",
      "migrated",
      now() - Duration::hours(2)
    );
    legacy.completed = true;
    legacy.completed_at =
      Some(now() - Duration::hours(1));
    let report = compute_report(
      Period::Today,
      &[legacy],
      &[],
      &ctx()
    );
    assert_eq!(
      report.metrics.completed_count,
      1
    );
    assert!(
      report.series.completion_trend.has_data
    );
  }

  #[test]
  fn completed_before_created_is_tolerated()
  {
    let mut anomaly = Task::new(
      "odd",
      "anomaly",
      now() - Duration::hours(1)
    );
    anomaly.status = TaskStatus::Done;
    anomaly.completed = true;
    anomaly.completed_at =
      Some(now() - Duration::days(3));
    let report = compute_report(
      Period::Today,
      &[anomaly],
      &[],
      &ctx()
    );
    assert_eq!(report.metrics.total_count, 1);
    assert_eq!(
      report.metrics.completed_count,
      1
    );
    assert!(
      !report.series.completion_trend.has_data
    );
  }

  struct FixedSource {
    tasks:    Vec<Task>,
    sessions: Vec<FocusSession>,
    fail:     bool
  }

  impl RecordSource for FixedSource {
    async fn fetch_tasks(
      &self
    ) -> anyhow::Result<Vec<Task>> {
      tokio::time::sleep(
        std::time::Duration::from_millis(50)
      )
      .await;
      Ok(self.tasks.clone())
    }

    async fn fetch_sessions(
      &self
    ) -> anyhow::Result<Vec<FocusSession>> {
      if self.fail {
        return Err(anyhow!(
          "service unavailable"
        ));
      }
      Ok(self.sessions.clone())
    }
  }

  #[tokio::test(start_paused = true)]
  async fn fetch_report_computes_from_source() {
    let source = FixedSource {
      tasks:    vec![Task::new(
        "a",
        "fetched",
        now() - Duration::hours(1)
      )],
      sessions: vec![session(
        1500,
        now() - Duration::hours(2)
      )],
      fail:     false
    };
    let outcome = fetch_report(
      &source,
      Period::Today,
      &ctx()
    )
    .await;
    assert!(outcome.error.is_none());
    assert_eq!(
      outcome.report.metrics.total_count,
      1
    );
    assert_eq!(
      outcome.report.metrics.session_count,
      1
    );
  }

  #[tokio::test(start_paused = true)]
  async fn fetch_failure_yields_empty_report() {
    let source = FixedSource {
      tasks:    vec![Task::new(
        "a",
        "fetched",
        now() - Duration::hours(1)
      )],
      sessions: vec![],
      fail:     true
    };
    let outcome = fetch_report(
      &source,
      Period::Today,
      &ctx()
    )
    .await;
    let err =
      outcome.error.expect("error surfaced");
    assert!(
      err
        .to_string()
        .contains("service unavailable")
    );
    assert_eq!(
      outcome.report.metrics.total_count,
      0
    );
    assert_eq!(
      outcome.report.insights.len(),
      3
    );
  }
}
