//! Values derived from a [`ProfileRecord`] for the profile card.
//!
//! Nothing here is stored; every function recomputes from the record.

use super::types::{ProfileExtra, ProfileRecord};
use chrono::{Local, TimeZone, Utc};

const PROGRESS_EPSILON: f64 = 0.1;
const TRAFFIC_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Share of the quota already used, in percent.
///
/// The denominator is `total + 0.1` so an empty snapshot yields 0.
pub fn progress_percent(extra: Option<&ProfileExtra>) -> u64 {
  let Some(extra) = extra else {
    return 0;
  };
  let used = extra.upload.saturating_add(extra.download) as f64;
  ((used * 100.0) / (extra.total as f64 + PROGRESS_EPSILON)).round() as u64
}

/// Calendar date of an epoch timestamp in local time, `-` for 0 or absent.
pub fn expire_date(expire: Option<u64>) -> String {
  expire_date_in(expire, &Local)
}

pub fn expire_date_in<Tz: TimeZone>(expire: Option<u64>, tz: &Tz) -> String
where
  Tz::Offset: std::fmt::Display,
{
  match expire.filter(|secs| *secs > 0) {
    Some(secs) => match tz.timestamp_opt(secs as i64, 0).single() {
      Some(date) => date.format("%Y-%m-%d").to_string(),
      None => "-".to_string(),
    },
    None => "-".to_string(),
  }
}

/// Human relative time between `updated` and `now`, both epoch seconds.
///
/// Thresholds follow the usual "x minutes ago" buckets.
pub fn from_now(updated: u64, now: u64) -> String {
  if updated == 0 {
    return String::new();
  }
  let secs = now.saturating_sub(updated) as f64;
  let minutes = secs / 60.0;
  let hours = minutes / 60.0;
  let days = hours / 24.0;
  let months = days / 30.0;
  let years = days / 365.0;

  if secs < 45.0 {
    "a few seconds ago".to_string()
  } else if secs < 90.0 {
    "a minute ago".to_string()
  } else if minutes < 45.0 {
    format!("{} minutes ago", minutes.round() as u64)
  } else if minutes < 90.0 {
    "an hour ago".to_string()
  } else if hours < 22.0 {
    format!("{} hours ago", hours.round() as u64)
  } else if hours < 36.0 {
    "a day ago".to_string()
  } else if days < 26.0 {
    format!("{} days ago", days.round() as u64)
  } else if days < 46.0 {
    "a month ago".to_string()
  } else if days < 320.0 {
    format!("{} months ago", months.round().max(2.0) as u64)
  } else if months < 18.0 {
    "a year ago".to_string()
  } else {
    format!("{} years ago", years.round().max(2.0) as u64)
  }
}

pub fn now_secs() -> u64 {
  Utc::now().timestamp().max(0) as u64
}

/// Host part of a subscription url, `local file` when it cannot be parsed.
pub fn source_host(url: Option<&str>) -> String {
  let Some(raw) = url.filter(|u| !u.is_empty()) else {
    return String::new();
  };
  match url::Url::parse(raw) {
    Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed
      .host_str()
      .map(|host| match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
      })
      .unwrap_or_else(|| "local file".to_string()),
    _ => "local file".to_string(),
  }
}

/// Formats a byte count as `(value, unit)`.
pub fn format_traffic(bytes: u64) -> (String, &'static str) {
  if bytes < 1000 {
    return (bytes.to_string(), TRAFFIC_UNITS[0]);
  }
  let exp = ((63 - bytes.leading_zeros()) / 10).min(TRAFFIC_UNITS.len() as u32 - 1);
  let value = bytes as f64 / 1024f64.powi(exp as i32);
  let text = if value >= 1000.0 {
    format!("{value:.0}")
  } else {
    to_precision_3(value)
  };
  (text, TRAFFIC_UNITS[exp as usize])
}

fn to_precision_3(value: f64) -> String {
  if value >= 100.0 {
    format!("{value:.0}")
  } else if value >= 10.0 {
    format!("{value:.1}")
  } else {
    format!("{value:.2}")
  }
}

/// `used / total` line shown when a subscription reports usage.
pub fn usage_label(extra: &ProfileExtra) -> String {
  let (used, used_unit) = format_traffic(extra.upload.saturating_add(extra.download));
  let (total, total_unit) = format_traffic(extra.total);
  format!("{used}{used_unit} / {total}{total_unit}")
}

/// Everything the card needs in one place.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileCard {
  pub uid: String,
  pub name: String,
  pub subtitle: String,
  pub updated_label: String,
  pub usage: Option<String>,
  pub expire: String,
  pub updated_date: String,
  pub progress: u64,
}

impl ProfileCard {
  pub fn build(record: &ProfileRecord, now: u64) -> Self {
    let subtitle = match record.desc.as_deref().filter(|d| !d.is_empty()) {
      Some(desc) => desc.to_string(),
      None if record.has_url() => source_host(record.url.as_deref()),
      None => String::new(),
    };
    let updated_label = if record.has_url() {
      from_now(record.updated, now)
    } else {
      String::new()
    };

    Self {
      uid: record.uid.clone(),
      name: record.name.clone(),
      subtitle,
      updated_label,
      usage: record.extra.as_ref().map(usage_label),
      expire: expire_date(record.extra.map(|e| e.expire)),
      updated_date: expire_date(Some(record.updated)),
      progress: progress_percent(record.extra.as_ref()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::profile::types::ProfileKind;

  #[test]
  fn test_progress_with_empty_quota_is_zero() {
    let extra = ProfileExtra::default();
    assert_eq!(progress_percent(Some(&extra)), 0);
    assert_eq!(progress_percent(None), 0);
  }

  #[test]
  fn test_progress_rounds() {
    let extra = ProfileExtra {
      upload: 256,
      download: 256,
      total: 1024,
      expire: 0,
    };
    assert_eq!(progress_percent(Some(&extra)), 50);
  }

  #[test]
  fn test_expire_date_sentinel() {
    assert_eq!(expire_date(Some(0)), "-");
    assert_eq!(expire_date(None), "-");
  }

  #[test]
  fn test_expire_date_fixed_calendar_day() {
    assert_eq!(expire_date_in(Some(1_700_000_000), &Utc), "2023-11-14");
  }

  #[test]
  fn test_from_now_buckets() {
    let now = 1_700_000_000;
    assert_eq!(from_now(0, now), "");
    assert_eq!(from_now(now - 10, now), "a few seconds ago");
    assert_eq!(from_now(now - 60, now), "a minute ago");
    assert_eq!(from_now(now - 10 * 60, now), "10 minutes ago");
    assert_eq!(from_now(now - 60 * 60, now), "an hour ago");
    assert_eq!(from_now(now - 5 * 3600, now), "5 hours ago");
    assert_eq!(from_now(now - 24 * 3600, now), "a day ago");
    assert_eq!(from_now(now - 3 * 86400, now), "3 days ago");
  }

  #[test]
  fn test_source_host() {
    assert_eq!(source_host(None), "");
    assert_eq!(
      source_host(Some("https://sub.example.com/api?token=x")),
      "sub.example.com"
    );
    assert_eq!(source_host(Some("not a url")), "local file");
  }

  #[test]
  fn test_format_traffic() {
    assert_eq!(format_traffic(512), ("512".to_string(), "B"));
    assert_eq!(format_traffic(1536), ("1.50".to_string(), "KB"));
    assert_eq!(format_traffic(10 * 1024 * 1024 * 1024), ("10.0".to_string(), "GB"));
    assert_eq!(format_traffic(1000 * 1024), ("1000".to_string(), "KB"));
  }

  #[test]
  fn test_card_uses_description_before_host() {
    let mut record = ProfileRecord::new("R1", "Remote", ProfileKind::Remote)
      .with_url("https://sub.example.com/x");
    let card = ProfileCard::build(&record, 0);
    assert_eq!(card.subtitle, "sub.example.com");
    assert!(card.usage.is_none());

    record.desc = Some("my subscription".to_string());
    record.extra = Some(ProfileExtra {
      upload: 0,
      download: 512,
      total: 1024,
      expire: 0,
    });
    let card = ProfileCard::build(&record, 0);
    assert_eq!(card.subtitle, "my subscription");
    assert_eq!(card.usage.as_deref(), Some("512B / 1.00KB"));
    assert_eq!(card.expire, "-");
  }
}
