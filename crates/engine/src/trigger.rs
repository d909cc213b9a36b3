//! Schedule triggers.
//!
//! Two forms are accepted:
//! - a seconds-resolution cron expression (`*/30 * * * * *`), evaluated in UTC
//! - `@every <n><unit>` with unit `ms`, `s`, `m` or `h` (`@every 500ms`)

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("schedule expression is empty")]
    Empty,

    #[error("invalid cron expression: {0}")]
    InvalidCron(#[from] cron::error::Error),

    #[error("invalid interval {0:?}: expected @every <n>ms|s|m|h")]
    InvalidInterval(String),

    #[error("schedule never fires")]
    NeverFires,
}

/// A parsed schedule that can compute the delay until its next firing.
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron(Box<Schedule>),
    Every(Duration),
}

impl Trigger {
    pub fn parse(expression: &str) -> Result<Self, TriggerError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(TriggerError::Empty);
        }

        let trigger = match expression.strip_prefix("@every") {
            Some(rest) => Trigger::Every(parse_interval(rest.trim())?),
            None => Trigger::Cron(Box::new(Schedule::from_str(expression)?)),
        };

        if trigger.next_delay().is_none() {
            return Err(TriggerError::NeverFires);
        }
        Ok(trigger)
    }

    /// Time to wait from now until the next firing, or `None` if the
    /// schedule has no future firings.
    pub fn next_delay(&self) -> Option<Duration> {
        match self {
            Trigger::Every(interval) => Some(*interval),
            Trigger::Cron(schedule) => {
                let now = Utc::now();
                let next = schedule.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

fn parse_interval(raw: &str) -> Result<Duration, TriggerError> {
    let invalid = || TriggerError::InvalidInterval(raw.to_string());

    let split = raw.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (digits, unit) = raw.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    let interval = match unit {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(3600)),
        _ => return Err(invalid()),
    };

    if interval.is_zero() {
        return Err(invalid());
    }
    Ok(interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_cron() {
        let trigger = Trigger::parse("*/30 * * * * *").unwrap();
        let delay = trigger.next_delay().unwrap();
        assert!(delay <= Duration::from_secs(30));
    }

    #[test]
    fn test_parse_every() {
        match Trigger::parse("@every 500ms").unwrap() {
            Trigger::Every(d) => assert_eq!(d, Duration::from_millis(500)),
            other => panic!("unexpected trigger {:?}", other),
        }
        match Trigger::parse("@every 2m").unwrap() {
            Trigger::Every(d) => assert_eq!(d, Duration::from_secs(120)),
            other => panic!("unexpected trigger {:?}", other),
        }
    }

    #[test]
    fn test_rejects_invalid_expressions() {
        assert!(matches!(Trigger::parse("   "), Err(TriggerError::Empty)));
        assert!(matches!(Trigger::parse("every thirty seconds"), Err(TriggerError::InvalidCron(_))));
        assert!(matches!(Trigger::parse("@every"), Err(TriggerError::InvalidInterval(_))));
        assert!(matches!(Trigger::parse("@every 0s"), Err(TriggerError::InvalidInterval(_))));
        assert!(matches!(Trigger::parse("@every 5d"), Err(TriggerError::InvalidInterval(_))));
        assert!(matches!(Trigger::parse("@every ms"), Err(TriggerError::InvalidInterval(_))));
    }

    #[test]
    fn test_rejects_schedule_in_the_past() {
        // Seconds, minutes, hours, day of month, month, day of week, year.
        assert!(matches!(
            Trigger::parse("0 0 0 1 1 * 2001"),
            Err(TriggerError::NeverFires)
        ));
    }
}
