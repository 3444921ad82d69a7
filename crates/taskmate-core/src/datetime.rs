use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "taskmate-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKMATE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKMATE_TIME_CONFIG";
const DEFAULT_TIMEZONE: &str = "UTC";
const GAP_PROBE_MINUTES: i64 = 15;
const GAP_PROBE_STEPS: i64 = 12;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone used for "local" day
/// boundaries when the caller does not
/// supply one.
pub fn default_timezone() -> Tz {
  static DEFAULT_TZ: OnceLock<Tz> =
    OnceLock::new();
  *DEFAULT_TZ
    .get_or_init(resolve_timezone)
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

#[must_use]
pub fn format_local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> String {
  dt.with_timezone(tz)
    .format("%Y-%m-%d")
    .to_string()
}

/// First instant of `date` in `tz`.
///
/// Ambiguous midnights resolve to the
/// earliest instant. A midnight that
/// falls into a DST gap resolves to the
/// first valid local time after it.
pub fn local_midnight(
  date: NaiveDate,
  tz: &Tz
) -> DateTime<Utc> {
  let midnight =
    date.and_time(NaiveTime::MIN);
  match tz.from_local_datetime(&midnight)
  {
    | LocalResult::Single(local) => {
      local.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        date = %date,
        first = %first,
        second = %second,
        "ambiguous local midnight; using earliest"
      );
      first.min(second).with_timezone(&Utc)
    }
    | LocalResult::None => {
      for step in 1..=GAP_PROBE_STEPS {
        let probe = midnight
          + Duration::minutes(
            GAP_PROBE_MINUTES * step
          );
        if let Some(local) = tz
          .from_local_datetime(&probe)
          .earliest()
        {
          tracing::warn!(
            date = %date,
            resolved = %local,
            "local midnight falls in a DST gap"
          );
          return local.with_timezone(&Utc);
        }
      }
      tracing::error!(
        date = %date,
        timezone = %tz,
        "no valid local time near midnight; treating as UTC"
      );
      midnight.and_utc()
    }
  }
}

/// Formats a second count as `Xh Ym`.
pub fn format_hours_minutes(
  seconds: u64
) -> String {
  let hours = seconds / 3600;
  let minutes = (seconds % 3600) / 60;
  format!("{hours}h {minutes}m")
}

fn resolve_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
  {
    if let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    ) {
      return tz;
    }
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_TIMEZONE,
    "DEFAULT_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Ok(
        first
          .min(second)
          .with_timezone(&Utc)
      )
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in configured \
         timezone: {context}"
      ))
    }
  }
}

/// Parses the instant expressions
/// accepted by `--now`.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_instant_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return Ok(local_midnight(
        local_date(now, tz),
        tz
      ));
    }
    | "yesterday" => {
      let today =
        parse_instant_expr("today", now, tz)?;
      return Ok(
        today - Duration::days(1)
      );
    }
    | "tomorrow" => {
      let today =
        parse_instant_expr("today", now, tz)?;
      return Ok(
        today + Duration::days(1)
      );
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::try_days(num),
      | "h" => Duration::try_hours(num),
      | "m" => Duration::try_minutes(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ))
      }
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    })?;

    let shifted = if sign == "-" {
      now.checked_sub_signed(duration)
    } else {
      now.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    });
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Ok(ndt.and_utc());
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(local_midnight(date, tz));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        ndt, tz, fmt
      );
    }
  }

  Err(anyhow!(
    "unrecognized instant expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/yesterday/tomorrow, \
     +Nd/+Nh/+Nm, -Nd/-Nh/-Nm, \
     RFC3339, YYYY-MM-DD, \
     YYYY-MM-DDTHH:MM, YYYY-MM-DD \
     HH:MM, YYYYMMDDTHHMMSSZ"
  })
}

/// Serde adapter for backend timestamps.
///
/// Accepts RFC 3339 strings, the compact
/// `YYYYMMDDTHHMMSSZ` form, and
/// `{seconds, nanoseconds}` objects.
/// Anything else deserializes to `None`.
pub mod lenient_timestamp {
  use chrono::{
    DateTime,
    NaiveDateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };
  use serde_json::Value;

  pub fn serialize<S>(
    dt: &Option<DateTime<Utc>>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match dt {
      | Some(value) => {
        serializer
          .serialize_str(&value.to_rfc3339())
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<
    Option<DateTime<Utc>>,
    D::Error
  >
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<Value>::deserialize(
        deserializer
      )?;
    Ok(raw.as_ref().and_then(parse_value))
  }

  pub fn parse_value(
    value: &Value
  ) -> Option<DateTime<Utc>> {
    let parsed = match value {
      | Value::Null => return None,
      | Value::String(raw) => {
        parse_str(raw)
      }
      | Value::Object(map) => {
        let seconds = map
          .get("seconds")
          .or_else(|| map.get("_seconds"))
          .and_then(Value::as_i64);
        let nanos = map
          .get("nanoseconds")
          .or_else(|| {
            map.get("_nanoseconds")
          })
          .and_then(Value::as_u64)
          .and_then(|n| {
            u32::try_from(n).ok()
          })
          .unwrap_or(0);
        seconds.and_then(|secs| {
          DateTime::from_timestamp(
            secs, nanos
          )
        })
      }
      | _ => None
    };

    if parsed.is_none() {
      tracing::warn!(
        value = %value,
        "ignoring malformed timestamp"
      );
    }
    parsed
  }

  fn parse_str(
    raw: &str
  ) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) =
      DateTime::parse_from_rfc3339(
        trimmed
      )
    {
      return Some(
        dt.with_timezone(&Utc)
      );
    }
    NaiveDateTime::parse_from_str(
      trimmed,
      "%Y%m%dT%H%M%SZ"
    )
    .ok()
    .map(|ndt| ndt.and_utc())
  }

  #[cfg(test)]
  mod tests {
    use chrono::{
      TimeZone,
      Utc
    };
    use serde_json::json;

    use super::parse_value;

    #[test]
    fn accepts_backend_timestamp_object()
    {
      let parsed = parse_value(&json!({
        "seconds": 1771321200,
        "nanoseconds": 0
      }));
      assert_eq!(
        parsed,
        Utc
          .timestamp_opt(1771321200, 0)
          .single()
      );
    }

    #[test]
    fn accepts_compact_form() {
      let parsed = parse_value(&json!(
        "20260217T120000Z"
      ));
      assert_eq!(
        parsed,
        Utc
          .with_ymd_and_hms(
            2026, 2, 17, 12, 0, 0
          )
          .single()
      );
    }

    #[test]
    fn rejects_numbers_and_garbage() {
      assert_eq!(
        parse_value(&json!(12)),
        None
      );
      assert_eq!(
        parse_value(&json!("soon")),
        None
      );
    }
  }
}
