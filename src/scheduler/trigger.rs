//! Trigger expressions: `@every <duration>` intervals and cron schedules.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::SchedulerError;

static DURATION_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+(?:ms|s|m|h))+$").unwrap());
static DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(ms|s|m|h)").unwrap());

const EVERY_PREFIX: &str = "@every";

/// Computes when a trigger fires next.
pub trait TriggerSchedule: Send + Sync {
    /// First fire time strictly after `after`, or `None` when exhausted.
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// A parsed trigger expression.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fire every fixed interval.
    Every(Duration),
    /// Fire on a cron schedule (seconds field first).
    Cron(Box<cron::Schedule>),
}

impl Trigger {
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let trimmed = expression.trim();
        let invalid = |reason: String| SchedulerError::InvalidTrigger {
            expression: expression.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("empty expression".into()));
        }

        if let Some(rest) = trimmed.strip_prefix(EVERY_PREFIX) {
            if !rest.starts_with(char::is_whitespace) {
                return Err(invalid(format!("expected `{EVERY_PREFIX} <duration>`")));
            }
            return parse_duration(rest.trim()).map(Trigger::Every).map_err(invalid);
        }

        cron::Schedule::from_str(trimmed)
            .map(|schedule| Trigger::Cron(Box::new(schedule)))
            .map_err(|e| invalid(format!("invalid cron: {e}")))
    }
}

impl TriggerSchedule for Trigger {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                after.checked_add_signed(step)
            }
            Trigger::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

impl FromStr for Trigger {
    type Err = SchedulerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trigger::parse(s)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Every(interval) => write!(f, "{EVERY_PREFIX} {}", format_duration(*interval)),
            Trigger::Cron(schedule) => write!(f, "{schedule}"),
        }
    }
}

/// Parse `1h30m`, `45s`, `250ms` and the like. Zero is rejected.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    if !DURATION_FORMAT.is_match(raw) {
        return Err(format!("invalid duration {raw:?}; use e.g. 30s, 5m, 1h30m, 250ms"));
    }

    let mut total = Duration::ZERO;
    for caps in DURATION_PART.captures_iter(raw) {
        let value: u64 = caps[1]
            .parse()
            .map_err(|e| format!("invalid number {:?}: {e}", &caps[1]))?;
        let part = match &caps[2] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            _ => Duration::from_secs(value.saturating_mul(3600)),
        };
        total = total.saturating_add(part);
    }

    if total.is_zero() {
        return Err("duration must be greater than zero".into());
    }
    Ok(total)
}

fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 3_600_000 == 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}
