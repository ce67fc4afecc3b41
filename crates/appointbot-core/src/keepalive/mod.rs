pub mod sql;
pub mod timer;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::DatabaseError;

pub use sql::{probe_for, PostgresProbe, SqlServerProbe};
pub use timer::KeepAliveTimer;

/// Result of one liveness query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveReport {
    /// Rows returned by the liveness query.
    pub rows: Vec<i32>,
    pub elapsed: Duration,
}

pub type KeepAliveResult = Result<KeepAliveReport, DatabaseError>;

/// Opens a connection, runs a trivial query and closes the connection again.
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// Run the liveness query and return the rows it produced.
    async fn ping(&self) -> Result<Vec<i32>, DatabaseError>;
}

/// Run one keep-alive probe and log the outcome.
pub async fn run_keepalive(probe: &dyn DatabaseProbe, trigger: &str) -> KeepAliveResult {
    let started = Instant::now();
    match probe.ping().await {
        Ok(rows) => {
            let elapsed = started.elapsed();
            info!(
                "Keep alive query result ({}): {:?} in {}ms",
                trigger,
                rows,
                elapsed.as_millis()
            );
            Ok(KeepAliveReport { rows, elapsed })
        }
        Err(e) => {
            error!("Keep alive query failed ({}): {}", trigger, e);
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe double that always answers the same way and counts calls.
    pub struct FixedProbe {
        outcome: Result<Vec<i32>, DatabaseError>,
        pub calls: AtomicUsize,
    }

    impl FixedProbe {
        pub fn ok() -> Self {
            Self {
                outcome: Ok(vec![1]),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(err: DatabaseError) -> Self {
            Self {
                outcome: Err(err),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DatabaseProbe for FixedProbe {
        async fn ping(&self) -> Result<Vec<i32>, DatabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedProbe;
    use super::*;

    #[tokio::test]
    async fn test_run_keepalive_success() {
        let probe = FixedProbe::ok();
        let report = run_keepalive(&probe, "test").await.unwrap();
        assert_eq!(report.rows, vec![1]);
        assert_eq!(probe.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_keepalive_failure() {
        let probe = FixedProbe::failing(DatabaseError::Connect("login failed".into()));
        let err = run_keepalive(&probe, "test").await.unwrap_err();
        assert_eq!(err, DatabaseError::Connect("login failed".into()));
    }
}
