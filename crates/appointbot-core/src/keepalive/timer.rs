use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::ConfigError;

use super::{run_keepalive, DatabaseProbe, KeepAliveReport};

/// Fires the keep-alive probe on a cron schedule.
pub struct KeepAliveTimer {
    schedule: Schedule,
    timezone: Tz,
    probe: Arc<dyn DatabaseProbe>,
}

impl KeepAliveTimer {
    pub fn new(expr: &str, timezone: Tz, probe: Arc<dyn DatabaseProbe>) -> Result<Self, ConfigError> {
        Ok(Self {
            schedule: parse_schedule(expr)?,
            timezone,
            probe,
        })
    }

    /// Next fire time strictly after `now`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.timezone))
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Next fire time after both `now` and the slot that last fired, so a wall
    /// clock that trails the sleep never repeats a slot.
    pub fn following_fire(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let from = previous.map_or(now, |prev| prev.max(now));
        self.next_fire_after(from)
    }

    /// One timer invocation. Failures are logged only; nothing is returned to a caller.
    pub async fn fire(&self) -> Option<KeepAliveReport> {
        let span = info_span!("invocation", id = %Uuid::new_v4(), trigger = "timerTriggerKeepAlive");
        async {
            info!("Timer function processed request");
            run_keepalive(self.probe.as_ref(), "timer").await.ok()
        }
        .instrument(span)
        .await
    }

    /// Sleep until each fire time and probe, until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut previous = None;
        loop {
            let now = Utc::now();
            let next = match self.following_fire(previous, now) {
                Some(next) => next,
                None => {
                    warn!("Keep-alive schedule has no upcoming fire time; timer stopped");
                    return;
                }
            };
            info!("Next keep-alive at {}", next.with_timezone(&self.timezone));

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Keep-alive timer stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {
                    self.fire().await;
                    previous = Some(next);
                }
            }
        }
    }
}

/// Parse a cron expression. Five-field crontab lines get a leading seconds field.
pub fn parse_schedule(expr: &str) -> Result<Schedule, ConfigError> {
    let cron_expr = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&cron_expr)
        .map_err(|e| ConfigError::Invalid(format!("invalid cron expression '{}': {}", expr, e)))
}
