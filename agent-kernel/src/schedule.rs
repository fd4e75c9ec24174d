//! Daily job schedule.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

/// Delay before retrying after a failed run.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Runs a job once a day at a fixed local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    retry_delay: Duration,
}

impl DailySchedule {
    /// Creates a schedule firing at `at` every day.
    #[must_use]
    pub const fn new(at: NaiveTime) -> Self {
        Self {
            at,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Parses an `HH:MM` time of day.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidTime`] when `value` is not a valid
    /// 24-hour `HH:MM` time.
    pub fn parse(value: &str) -> ScheduleResult<Self> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map(Self::new)
            .map_err(|err| ScheduleError::InvalidTime {
                value: value.to_owned(),
                reason: err.to_string(),
            })
    }

    /// Overrides the delay used after a failed run.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the configured time of day.
    #[must_use]
    pub const fn at(&self) -> NaiveTime {
        self.at
    }

    /// Next slot strictly after `now`: today's if still ahead, otherwise
    /// tomorrow's.
    #[must_use]
    pub fn next_run(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.at);
        if today > now {
            today
        } else {
            today + TimeDelta::days(1)
        }
    }

    /// Runs `job` at every slot until `shutdown` resolves.
    ///
    /// A failed run is logged and, after the retry delay, the loop waits for
    /// the next slot again.
    pub async fn run_daily<F, Fut, E>(&self, mut job: F, shutdown: impl Future<Output = ()>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        tokio::pin!(shutdown);

        loop {
            let now = Local::now().naive_local();
            let next = self.next_run(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next.format("%Y-%m-%d %H:%M"), wait_secs = wait.as_secs(), "waiting for scheduled run");

            tokio::select! {
                () = &mut shutdown => {
                    info!("scheduler stopped");
                    return;
                }
                () = sleep(wait) => {}
            }

            match job().await {
                Ok(()) => info!("scheduled run finished"),
                Err(err) => {
                    warn!(%err, retry_secs = self.retry_delay.as_secs(), "scheduled run failed");
                    tokio::select! {
                        () = &mut shutdown => {
                            info!("scheduler stopped");
                            return;
                        }
                        () = sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }
}

/// Errors produced by [`DailySchedule`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The time of day could not be parsed.
    #[error("invalid schedule time `{value}`: {reason}")]
    InvalidTime {
        /// Input as supplied.
        value: String,
        /// Parser message.
        reason: String,
    },
}

/// Result alias for schedule operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;
