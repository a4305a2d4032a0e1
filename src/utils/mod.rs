use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Season windows ───────────────────────────────────────────────────────────

/// Basketball and hockey seasons roll over in October.
const SEASON_ROLLOVER_MONTH: u32 = 10;

fn october_start_year(now: DateTime<Utc>) -> i32 {
    if now.month() >= SEASON_ROLLOVER_MONTH {
        now.year()
    } else {
        now.year() - 1
    }
}

/// NBA seasons are labelled by the year they tip off in October.
pub fn last_two_seasons_nba(now: DateTime<Utc>) -> Vec<i32> {
    let cur = october_start_year(now);
    vec![cur - 1, cur]
}

pub fn last_two_seasons_mlb(now: DateTime<Utc>) -> Vec<i32> {
    vec![now.year() - 1, now.year()]
}

/// NHL seasons are year pairs, e.g. `"20242025"`.
pub fn last_two_seasons_nhl(now: DateTime<Utc>) -> Vec<String> {
    let start = october_start_year(now);
    vec![
        format!("{}{}", start - 1, start),
        format!("{}{}", start, start + 1),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub nba: Vec<i32>,
    pub mlb: Vec<i32>,
    pub nhl: Vec<String>,
}

pub fn season_window(now: DateTime<Utc>) -> SeasonWindow {
    SeasonWindow {
        nba: last_two_seasons_nba(now),
        mlb: last_two_seasons_mlb(now),
        nhl: last_two_seasons_nhl(now),
    }
}

/// Validate an NHL season label and return its first year.
pub fn parse_nhl_season(season: &str) -> Result<i32> {
    let s = season.trim();
    if s.len() != 8 || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow!("NHL season must look like 20232024, got '{}'", season));
    }
    let first: i32 = s[..4].parse()?;
    let second: i32 = s[4..].parse()?;
    if second != first + 1 {
        return Err(anyhow!("NHL season '{}' does not span consecutive years", season));
    }
    Ok(first)
}

/// Oct 1 of the season's first year. The NHL box score carries no game date.
pub fn nhl_placeholder_date(start_year: i32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(start_year, 10, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Parse a provider timestamp: RFC 3339, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_provider_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Some(d.with_timezone(&Utc));
    }
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

// ── Raw payload helpers ──────────────────────────────────────────────────────

/// Provider identifier as a string; numbers and strings accepted, 0/"" treated as absent.
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(0) => None,
            Some(i) => Some(i.to_string()),
            None => Some(n.to_string()),
        },
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Non-empty string field.
pub fn json_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numeric stat from a number, a numeric string, or a `"mm:ss"` clock.
pub fn stat_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some((mins, secs)) = s.split_once(':') {
                let m: f64 = mins.parse().ok()?;
                let sec: f64 = secs.parse().ok()?;
                Some(m + sec / 60.0)
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

/// Integer counting stat, missing treated as zero.
pub fn count_stat(value: &Value) -> f64 {
    stat_value(value).unwrap_or(0.0)
}

/// "Ronald Acuña Jr." → ("Ronald", "Acuña Jr.").
pub fn split_full_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}
