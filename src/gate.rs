use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::Destination;
use crate::Result;

const MASTER_ROLE: &str = "master";

/// Whether the destination accepts writes.
///
/// Starts out not ready and flips to ready at most once.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_ready() -> Self {
        let readiness = Self::new();
        readiness.mark_ready();
        readiness
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Extract the value of the `role:` line from an `INFO replication` report.
pub fn parse_role(info: &str) -> Option<&str> {
    info.lines()
        .find_map(|line| line.strip_prefix("role:"))
        .map(str::trim)
}

/// Polls the destination until it reports the master role.
pub struct ReadinessGate<D> {
    destination: D,
    readiness: Readiness,
    poll_interval: Duration,
}

impl<D: Destination> ReadinessGate<D> {
    pub fn new(destination: D, readiness: Readiness, poll_interval: Duration) -> Self {
        Self {
            destination,
            readiness,
            poll_interval,
        }
    }

    /// Poll until the destination is master, then open the gate.
    ///
    /// Any error talking to the destination ends the poll, the caller is
    /// expected to treat it as fatal.
    pub async fn run(self) -> Result<()> {
        let mut polls: u64 = 0;
        loop {
            let info = self.destination.info("replication").await?;
            polls += 1;
            match parse_role(&info) {
                Some(MASTER_ROLE) => {
                    self.readiness.mark_ready();
                    warn!(polls, "Target is master - starting writes");
                    return Ok(());
                }
                role => {
                    if polls == 1 {
                        debug!(?role, "Target is not master yet, waiting for promotion");
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
