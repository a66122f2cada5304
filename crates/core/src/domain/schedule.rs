// Cron schedule wrapper
//
// Accepts the 5-field standard form (minute granularity) as well as the
// 6/7-field form with a leading seconds column. Day-of-week follows the cron
// crate numbering (1 = Sunday); names (MON..SUN) are unambiguous.

use crate::domain::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Upper bound when counting missed fire times after a long outage
pub const MAX_MISSED_COUNT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    inner: cron::Schedule,
}

/// Fire times that elapsed without a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedRuns {
    /// First fire time expected after the last recorded execution
    pub expected_at: i64,
    pub count: u32,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let normalized = match trimmed.split_whitespace().count() {
            5 => format!("0 {}", trimmed),
            6 | 7 => trimmed.to_string(),
            n => {
                return Err(DomainError::InvalidSchedule {
                    expression: expression.to_string(),
                    reason: format!("expected 5, 6 or 7 fields, got {}", n),
                })
            }
        };

        let inner =
            cron::Schedule::from_str(&normalized).map_err(|e| DomainError::InvalidSchedule {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expression: expression.to_string(),
            inner,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after_millis` (epoch ms)
    pub fn next_after(&self, after_millis: i64) -> Option<i64> {
        let after = to_datetime(after_millis)?;
        self.inner
            .after(&after)
            .next()
            .map(|t| t.timestamp_millis())
    }

    /// Length of the interval that starts at the next fire time after `after_millis`
    pub fn interval_after(&self, after_millis: i64) -> Option<i64> {
        let after = to_datetime(after_millis)?;
        let mut upcoming = self.inner.after(&after);
        let first = upcoming.next()?;
        let second = upcoming.next()?;
        Some((second - first).num_milliseconds())
    }

    /// Fire times strictly between the last execution and `fire_at`.
    ///
    /// `None` when the schedule fired on time (or never ran before).
    pub fn missed_runs(&self, last_executed_at: Option<i64>, fire_at: i64) -> Option<MissedRuns> {
        let last = last_executed_at?;
        let from = to_datetime(last)?;

        let mut expected_at = None;
        let mut count = 0u32;
        for t in self.inner.after(&from) {
            let millis = t.timestamp_millis();
            if millis >= fire_at || count >= MAX_MISSED_COUNT {
                break;
            }
            expected_at.get_or_insert(millis);
            count += 1;
        }

        expected_at.map(|expected_at| MissedRuns { expected_at, count })
    }
}

fn to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}
