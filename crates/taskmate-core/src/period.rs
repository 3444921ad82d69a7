use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Days,
  Months,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  warn
};

use crate::datetime::{
  local_date,
  local_midnight
};

/// Earliest local day covered by
/// [`Period::All`].
const ALL_TIME_FLOOR: (i32, u32, u32) =
  (2020, 1, 1);

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Period {
  Today,
  Week,
  Month,
  Year,
  All
}

impl Period {
  pub const ALL: [Period; 5] = [
    Period::Today,
    Period::Week,
    Period::Month,
    Period::Year,
    Period::All
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      | Self::Today => "today",
      | Self::Week => "week",
      | Self::Month => "month",
      | Self::Year => "year",
      | Self::All => "all"
    }
  }

  /// Lenient parse for callers that
  /// prefer a report over an error.
  pub fn parse_or_today(
    raw: &str
  ) -> Self {
    raw.parse().unwrap_or_else(
      |err: anyhow::Error| {
        warn!(
          selector = raw,
          error = %err,
          "unknown period; falling back to today"
        );
        Self::Today
      }
    )
  }
}

impl fmt::Display for Period {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Period {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "today" => Ok(Self::Today),
      | "week" => Ok(Self::Week),
      | "month" => Ok(Self::Month),
      | "year" => Ok(Self::Year),
      | "all" => Ok(Self::All),
      | _ => {
        Err(anyhow!(
          "unknown period {s:?}; \
           expected one of today, \
           week, month, year, all"
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  PartialEq,
  Eq,
)]
pub struct DateRange {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>
}

impl DateRange {
  /// Builds a range, clamping `start`
  /// so that `start <= end` holds.
  pub fn new(
    start: DateTime<Utc>,
    end: DateTime<Utc>
  ) -> Self {
    if start > end {
      debug!(
        start = %start,
        end = %end,
        "range start after end; clamping"
      );
      return Self {
        start: end,
        end
      };
    }
    Self {
      start,
      end
    }
  }

  /// Inclusive on both ends.
  pub fn contains(
    &self,
    instant: DateTime<Utc>
  ) -> bool {
    instant >= self.start
      && instant <= self.end
  }

  /// Local calendar days touched by the
  /// range, oldest first.
  pub fn local_days(
    &self,
    tz: &Tz
  ) -> Vec<NaiveDate> {
    let first =
      local_date(self.start, tz);
    let last = local_date(self.end, tz);
    first
      .iter_days()
      .take_while(|day| *day <= last)
      .collect()
  }
}

#[tracing::instrument(skip(now, tz), fields(period = %period))]
pub fn resolve_date_range(
  period: Period,
  now: DateTime<Utc>,
  tz: &Tz
) -> DateRange {
  let today = local_date(now, tz);
  let start_day = match period {
    | Period::Today => Some(today),
    | Period::Week => {
      today.checked_sub_days(Days::new(7))
    }
    | Period::Month => {
      today.checked_sub_months(
        Months::new(1)
      )
    }
    | Period::Year => {
      today.checked_sub_months(
        Months::new(12)
      )
    }
    | Period::All => {
      let (y, m, d) = ALL_TIME_FLOOR;
      NaiveDate::from_ymd_opt(y, m, d)
    }
  };

  let start = start_day
    .map(|day| local_midnight(day, tz))
    .unwrap_or(now);
  let range = DateRange::new(start, now);
  debug!(
    start = %range.start,
    end = %range.end,
    "resolved date range"
  );
  range
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    TimeZone,
    Utc
  };

  use super::{
    DateRange,
    Period,
    resolve_date_range
  };

  fn at(
    y: i32,
    m: u32,
    d: u32,
    h: u32,
    min: u32
  ) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(y, m, d, h, min, 0)
      .single()
      .expect("valid instant")
  }

  #[test]
  fn start_never_exceeds_end() {
    let zones = [
      chrono_tz::UTC,
      chrono_tz::America::Mexico_City,
      chrono_tz::Pacific::Kiritimati,
      chrono_tz::America::Sao_Paulo
    ];
    let nows = [
      at(2026, 2, 17, 12, 0),
      at(2026, 3, 31, 0, 5),
      at(2024, 2, 29, 23, 59),
      at(2018, 11, 4, 3, 30),
      at(2019, 6, 1, 0, 0)
    ];
    for tz in &zones {
      for now in nows {
        for period in Period::ALL {
          let range =
            resolve_date_range(period, now, tz);
          assert!(
            range.start <= range.end,
            "{period} at {now} in {tz}"
          );
          assert_eq!(range.end, now);
        }
      }
    }
  }

  #[test]
  fn today_starts_at_local_midnight() {
    let tz = chrono_tz::America::Mexico_City;
    let now = at(2026, 2, 17, 3, 0);
    let range = resolve_date_range(
      Period::Today,
      now,
      &tz
    );
    assert_eq!(
      range
        .start
        .with_timezone(&tz)
        .format("%Y-%m-%d %H:%M")
        .to_string(),
      "2026-02-16 00:00"
    );
  }

  #[test]
  fn week_and_month_truncate_to_midnight() {
    let tz = chrono_tz::UTC;
    let now = at(2026, 3, 31, 15, 45);
    assert_eq!(
      resolve_date_range(
        Period::Week,
        now,
        &tz
      )
      .start,
      at(2026, 3, 24, 0, 0)
    );
    assert_eq!(
      resolve_date_range(
        Period::Month,
        now,
        &tz
      )
      .start,
      at(2026, 2, 28, 0, 0)
    );
    assert_eq!(
      resolve_date_range(
        Period::Year,
        now,
        &tz
      )
      .start,
      at(2025, 3, 31, 0, 0)
    );
  }

  #[test]
  fn all_time_uses_fixed_floor() {
    let range = resolve_date_range(
      Period::All,
      at(2026, 2, 17, 12, 0),
      &chrono_tz::UTC
    );
    assert_eq!(
      range.start,
      at(2020, 1, 1, 0, 0)
    );
  }

  #[test]
  fn all_time_before_floor_is_clamped() {
    let now = at(2019, 6, 1, 0, 0);
    let range = resolve_date_range(
      Period::All,
      now,
      &chrono_tz::UTC
    );
    assert_eq!(range.start, now);
  }

  #[test]
  fn unknown_selector_is_explicit() {
    assert!(
      "fortnight".parse::<Period>().is_err()
    );
    assert_eq!(
      "WEEK"
        .parse::<Period>()
        .expect("case-insensitive"),
      Period::Week
    );
    assert_eq!(
      Period::parse_or_today("fortnight"),
      Period::Today
    );
  }

  #[test]
  fn range_is_inclusive_and_lists_local_days()
  {
    let range = DateRange::new(
      at(2026, 2, 15, 0, 0),
      at(2026, 2, 17, 12, 0)
    );
    assert!(range.contains(range.start));
    assert!(range.contains(range.end));
    assert!(
      !range.contains(at(2026, 2, 17, 12, 1))
    );
    let days =
      range.local_days(&chrono_tz::UTC);
    assert_eq!(days.len(), 3);
    assert_eq!(
      days[0].to_string(),
      "2026-02-15"
    );
  }
}
