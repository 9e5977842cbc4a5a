//! Recurrence parsing and next occurrence calculation.
//!
//! A schedule's repeat interval may be a human-readable interval ("1 day",
//! "12 hours", "every 2 weeks"), a compact interval (`@every 1h30m`), a
//! shortcut (`@daily`, `@hourly`, ...) or a standard 5/6-field cron
//! expression.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid one-shot schedule.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// A repeat schedule for a job.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// The original expression string.
    expression: String,
    /// The timezone cron expressions are evaluated in.
    timezone: String,
    /// Parsed schedule type.
    schedule_type: ScheduleType,
}

#[derive(Debug, Clone)]
enum ScheduleType {
    /// Standard cron schedule.
    Cron(Box<CronSchedule>),
    /// Fixed interval between occurrences.
    Interval(Duration),
}

impl Schedule {
    /// Create a new schedule evaluated in UTC.
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::with_timezone(expression, "UTC")
    }

    /// Create a new schedule with a specific timezone.
    pub fn with_timezone(
        expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let timezone = timezone.into();

        timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.clone()))?;

        let schedule_type = Self::parse_expression(&expression)?;

        Ok(Self {
            expression,
            timezone,
            schedule_type,
        })
    }

    fn parse_expression(expression: &str) -> Result<ScheduleType, ScheduleError> {
        let trimmed = expression.trim();

        if trimmed.starts_with('@') {
            return Self::parse_shortcut(trimmed);
        }

        if let Ok(duration) = parse_human_interval(trimmed) {
            return Ok(ScheduleType::Interval(duration));
        }

        match trimmed.split_whitespace().count() {
            5 | 6 => Self::parse_cron(trimmed),
            _ => Err(ScheduleError::InvalidInterval(trimmed.to_string())),
        }
    }

    /// Parse a shortcut expression (@daily, @every, etc.).
    fn parse_shortcut(expression: &str) -> Result<ScheduleType, ScheduleError> {
        match expression.to_lowercase().as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 * * *"),
            "@hourly" => Self::parse_cron("0 * * * *"),
            s if s.starts_with("@every ") => {
                parse_human_interval(&s[7..]).map(ScheduleType::Interval)
            }
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            ))),
        }
    }

    fn parse_cron(expression: &str) -> Result<ScheduleType, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();

        let cron_expr = match fields.len() {
            // Standard 5-field cron, add seconds field
            5 => format!("0 {}", expression),
            6 => expression.to_string(),
            _ => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    fields.len()
                )));
            }
        };

        let schedule = CronSchedule::from_str(&cron_expr)
            .map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;

        Ok(ScheduleType::Cron(Box::new(schedule)))
    }

    /// Get the next occurrence after the given time.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let tz: Tz = self
            .timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(self.timezone.clone()))?;

        match &self.schedule_type {
            ScheduleType::Cron(schedule) => {
                let local_time = after.with_timezone(&tz);
                schedule
                    .after(&local_time)
                    .next()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or(ScheduleError::NoMoreOccurrences)
            }
            ScheduleType::Interval(duration) => {
                let step = chrono::Duration::from_std(*duration)
                    .map_err(|_| ScheduleError::InvalidInterval(self.expression.clone()))?;
                after
                    .checked_add_signed(step)
                    .ok_or(ScheduleError::NoMoreOccurrences)
            }
        }
    }

    /// Fixed interval between occurrences, if this is not a cron schedule.
    pub fn interval(&self) -> Option<Duration> {
        match &self.schedule_type {
            ScheduleType::Interval(duration) => Some(*duration),
            _ => None,
        }
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Get the timezone.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

/// Resolve a one-shot schedule into the instant it should fire.
///
/// Accepts `now`, an RFC 3339 timestamp, a relative interval (`in 10
/// minutes`, `2 hours`), or a cron expression whose next occurrence is used.
pub fn resolve_run_at(
    spec: &str,
    now: DateTime<Utc>,
    timezone: &str,
) -> Result<DateTime<Utc>, ScheduleError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(ScheduleError::InvalidSchedule(spec.to_string()));
    }
    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(at.with_timezone(&Utc));
    }

    let lowered = trimmed.to_lowercase();
    let relative = lowered.strip_prefix("in ").unwrap_or(&lowered);
    if let Ok(offset) = parse_human_interval(relative) {
        let offset = chrono::Duration::from_std(offset)
            .map_err(|_| ScheduleError::InvalidSchedule(spec.to_string()))?;
        return now
            .checked_add_signed(offset)
            .ok_or_else(|| ScheduleError::InvalidSchedule(spec.to_string()));
    }

    match Schedule::with_timezone(trimmed, timezone) {
        Ok(schedule) => schedule.next_after(now),
        Err(ScheduleError::InvalidTimezone(tz)) => Err(ScheduleError::InvalidTimezone(tz)),
        Err(_) => Err(ScheduleError::InvalidSchedule(spec.to_string())),
    }
}

/// Parse a human-readable interval into a duration.
///
/// Accepts phrases such as `1 day`, `12 hours`, `1.5 hours`, `every 3 days`,
/// `1 day and 12 hours`, `a week`, and compact forms such as `30s` or `1h30m`.
pub fn parse_human_interval(s: &str) -> Result<Duration, ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(s.to_string());

    let lowered = s.trim().to_lowercase();
    let body = lowered.strip_prefix("every").unwrap_or(&lowered);
    let tokens: Vec<&str> = body
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty() && *t != "and")
        .collect();

    let total_millis = match tokens.as_slice() {
        [] => return Err(invalid()),
        [single] => match unit_millis(single) {
            Some(millis) => millis,
            None => parse_compact_millis(single).ok_or_else(invalid)?,
        },
        _ => {
            if tokens.len() % 2 != 0 {
                return Err(invalid());
            }
            let mut total = 0f64;
            for pair in tokens.chunks(2) {
                let amount = parse_amount(pair[0]).ok_or_else(invalid)?;
                let unit = unit_millis(pair[1]).ok_or_else(invalid)?;
                total += amount * unit;
            }
            total
        }
    };

    // Must fit a chrono::Duration so occurrences can be computed.
    if !total_millis.is_finite() || total_millis < 1.0 || total_millis >= i64::MAX as f64 {
        return Err(invalid());
    }

    Ok(Duration::from_millis(total_millis.round() as u64))
}

fn parse_amount(token: &str) -> Option<f64> {
    match token {
        "a" | "an" | "one" => Some(1.0),
        "two" => Some(2.0),
        "three" => Some(3.0),
        "four" => Some(4.0),
        "five" => Some(5.0),
        "six" => Some(6.0),
        "seven" => Some(7.0),
        "eight" => Some(8.0),
        "nine" => Some(9.0),
        "ten" => Some(10.0),
        "twelve" => Some(12.0),
        other => other.parse::<f64>().ok().filter(|n| *n >= 0.0),
    }
}

fn unit_millis(unit: &str) -> Option<f64> {
    const SECOND: f64 = 1_000.0;
    let millis = match unit {
        "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0 * SECOND,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600.0 * SECOND,
        "d" | "day" | "days" => 86_400.0 * SECOND,
        "w" | "wk" | "wks" | "week" | "weeks" => 7.0 * 86_400.0 * SECOND,
        "month" | "months" => 30.0 * 86_400.0 * SECOND,
        "y" | "yr" | "yrs" | "year" | "years" => 365.0 * 86_400.0 * SECOND,
        _ => return None,
    };
    Some(millis)
}

/// Parse a compact duration like "5m", "1h", "1h30m", "30s".
fn parse_compact_millis(s: &str) -> Option<f64> {
    let mut total = 0f64;
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() || c == '.' {
            current_num.push(c);
            continue;
        }
        let num: f64 = current_num.parse().ok()?;
        current_num.clear();
        let unit = match c {
            's' => 1_000.0,
            'm' => 60_000.0,
            'h' => 3_600_000.0,
            'd' => 86_400_000.0,
            'w' => 604_800_000.0,
            _ => return None,
        };
        total += num * unit;
    }

    // Trailing digits without a unit
    if !current_num.is_empty() {
        return None;
    }

    Some(total)
}
