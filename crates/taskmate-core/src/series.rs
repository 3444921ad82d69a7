use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::datetime::local_date;
use crate::period::DateRange;
use crate::record::{Priority, Task};

/// Chart width cap: only the most recent days are kept.
pub const MAX_BUCKETS: usize = 14;
pub const MAX_CATEGORIES: usize = 5;
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DailyBucket {
    pub day: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Series {
    pub buckets: Vec<DailyBucket>,
    /// False when every bucket is zero.
    pub has_data: bool,
}

/// How the records falling on one day are reduced to a bucket value.
pub enum BucketValue<'f, R> {
    Count,
    Sum(&'f dyn Fn(&R) -> f64),
}

/// Builds one bucket per local calendar day of `range`, keeping the most
/// recent [`MAX_BUCKETS`].
///
/// A record lands in the bucket whose local date equals the local date of
/// `timestamp(record)`; records without a timestamp are skipped.
pub fn build_daily_series<R>(
    range: &DateRange,
    tz: &Tz,
    records: &[R],
    timestamp: impl Fn(&R) -> Option<DateTime<Utc>>,
    value: BucketValue<'_, R>,
) -> Series {
    let mut days = range.local_days(tz);
    if days.len() > MAX_BUCKETS {
        let excess = days.len() - MAX_BUCKETS;
        days = days.split_off(excess);
    }

    let mut totals: BTreeMap<NaiveDate, f64> = days.iter().map(|day| (*day, 0.0)).collect();
    for record in records {
        let Some(ts) = timestamp(record) else {
            continue;
        };
        if let Some(slot) = totals.get_mut(&local_date(ts, tz)) {
            *slot += match &value {
                BucketValue::Count => 1.0,
                BucketValue::Sum(field) => field(record),
            };
        }
    }

    let buckets: Vec<DailyBucket> = totals
        .into_iter()
        .map(|(day, value)| DailyBucket { day, value })
        .collect();
    let has_data = buckets.iter().any(|bucket| bucket.value > 0.0);
    debug!(
        buckets = buckets.len(),
        records = records.len(),
        has_data,
        "built daily series"
    );
    Series { buckets, has_data }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Slice {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Breakdown {
    pub slices: Vec<Slice>,
    pub has_data: bool,
}

/// High, Medium, Low counts; a task without a priority counts as Medium.
pub fn priority_breakdown(tasks: &[&Task]) -> Breakdown {
    let slices = [Priority::High, Priority::Medium, Priority::Low]
        .into_iter()
        .map(|priority| Slice {
            label: priority.to_string(),
            count: tasks
                .iter()
                .filter(|task| task.effective_priority() == priority)
                .count() as u64,
        })
        .collect();
    Breakdown {
        slices,
        has_data: !tasks.is_empty(),
    }
}

/// Largest [`MAX_CATEGORIES`] lists by task count, ties broken by name.
pub fn category_breakdown(tasks: &[&Task]) -> Breakdown {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for task in tasks {
        let label = task
            .list
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNCATEGORIZED);
        *counts.entry(label).or_default() += 1;
    }

    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(MAX_CATEGORIES);

    Breakdown {
        slices: ranked
            .into_iter()
            .map(|(label, count)| Slice {
                label: label.to_string(),
                count,
            })
            .collect(),
        has_data: !tasks.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::{
        BucketValue, MAX_BUCKETS, build_daily_series, category_breakdown, priority_breakdown,
    };
    use crate::period::{DateRange, Period, resolve_date_range};
    use crate::record::{FocusSession, Priority, Task};

    fn at(m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, m, d, h, 0, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn series_is_capped_to_most_recent_days() {
        let tz = chrono_tz::UTC;
        for period in Period::ALL {
            let range = resolve_date_range(period, at(2, 17, 12), &tz);
            let series = build_daily_series::<Task>(
                &range,
                &tz,
                &[],
                |t| t.created_at,
                BucketValue::Count,
            );
            assert!(series.buckets.len() <= MAX_BUCKETS, "{period}");
            assert_eq!(
                series.buckets.last().map(|b| b.day),
                Some(at(2, 17, 12).date_naive())
            );
            assert!(!series.has_data);
        }

        let month = resolve_date_range(Period::Month, at(2, 17, 12), &tz);
        let series =
            build_daily_series::<Task>(&month, &tz, &[], |t| t.created_at, BucketValue::Count);
        assert_eq!(series.buckets.len(), MAX_BUCKETS);
        assert_eq!(series.buckets[0].day, at(2, 4, 0).date_naive());
    }

    #[test]
    fn counts_by_local_calendar_day() {
        let tz = chrono_tz::America::Mexico_City;
        let range = DateRange::new(at(2, 14, 6), at(2, 17, 12));
        // 02:00 UTC on the 16th is still the 15th in Mexico City.
        let tasks = vec![
            Task::new("a", "late evening", at(2, 16, 2)),
            Task::new("b", "morning", at(2, 16, 15)),
            Task::new("c", "outside", at(1, 20, 15)),
        ];
        let series =
            build_daily_series(&range, &tz, &tasks, |t| t.created_at, BucketValue::Count);
        let values: Vec<f64> = series.buckets.iter().map(|b| b.value).collect();
        assert_eq!(values, vec![0.0, 1.0, 1.0, 0.0]);
        assert!(series.has_data);
    }

    #[test]
    fn sums_a_field() {
        let tz = chrono_tz::UTC;
        let range = DateRange::new(at(2, 16, 0), at(2, 17, 23));
        let make = |secs: u64, day: u32| {
            FocusSession::new(
                None,
                "focus".to_string(),
                secs,
                at(2, day, 9),
                true,
                at(2, day, 9).date_naive(),
            )
        };
        let sessions = vec![make(1500, 16), make(1800, 16), make(600, 17)];
        let minutes = |s: &FocusSession| s.duration_seconds as f64 / 60.0;
        let series = build_daily_series(
            &range,
            &tz,
            &sessions,
            |s| s.started_at,
            BucketValue::Sum(&minutes),
        );
        let values: Vec<f64> = series.buckets.iter().map(|b| b.value).collect();
        assert_eq!(values, vec![55.0, 10.0]);
    }

    #[test]
    fn priority_defaults_to_medium() {
        let now = Utc::now();
        let mut high = Task::new("a", "a", now);
        high.priority = Some(Priority::High);
        let unset = Task::new("b", "b", now);
        let breakdown = priority_breakdown(&[&high, &unset]);
        let counts: Vec<(String, u64)> = breakdown
            .slices
            .into_iter()
            .map(|s| (s.label, s.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("High".to_string(), 1),
                ("Medium".to_string(), 1),
                ("Low".to_string(), 0)
            ]
        );
        assert!(!priority_breakdown(&[]).has_data);
    }

    #[test]
    fn categories_rank_top_five() {
        let now = Utc::now();
        let lists = [
            "Work", "Work", "Work", "Home", "Home", "Books", "Music", "Ideas", "Travel", "",
        ];
        let tasks: Vec<Task> = lists
            .iter()
            .enumerate()
            .map(|(i, list)| {
                let mut task = Task::new(format!("t{i}"), "t", now);
                task.list = Some(list.to_string());
                task
            })
            .collect();
        let refs: Vec<&Task> = tasks.iter().collect();
        let labels: Vec<String> = category_breakdown(&refs)
            .slices
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec!["Work", "Home", "Books", "Ideas", "Music"]);

        let mut stray = Task::new("x", "x", now);
        stray.list = None;
        let only = category_breakdown(&[&stray]);
        assert_eq!(only.slices[0].label, "Uncategorized");
    }
}
