//! Retry scheduling for failed tasks.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Exponential backoff bounds, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "default_base_minutes")]
    pub base_minutes: i64,
    #[serde(default = "default_max_minutes")]
    pub max_minutes: i64,
}

fn default_base_minutes() -> i64 {
    5
}

fn default_max_minutes() -> i64 {
    60
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_minutes: default_base_minutes(),
            max_minutes: default_max_minutes(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next retry.
    ///
    /// The previous delay is recovered from the task's own timestamps
    /// (`scheduled_at - last_tried_at`) as they were before the failing attempt.
    /// No previous delay, or one shorter than a minute, yields the base delay.
    pub fn next_delay(
        &self,
        scheduled_at: Option<DateTime<Utc>>,
        last_tried_at: Option<DateTime<Utc>>,
    ) -> Duration {
        let base = Duration::minutes(self.base_minutes);
        let max = Duration::minutes(self.max_minutes.max(self.base_minutes));

        let previous = match (scheduled_at, last_tried_at) {
            (Some(scheduled), Some(tried)) => scheduled - tried,
            _ => return base,
        };

        if previous < Duration::minutes(1) {
            return base;
        }

        (previous * 2).min(max).max(base)
    }

    /// Absolute time of the next retry.
    pub fn next_retry_at(
        &self,
        now: DateTime<Utc>,
        scheduled_at: Option<DateTime<Utc>>,
        last_tried_at: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        now + self.next_delay(scheduled_at, last_tried_at)
    }
}
