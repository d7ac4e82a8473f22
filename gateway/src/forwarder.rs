//! Single-flight forwarding loop. Exactly one instance runs per process;
//! it drains the queue oldest-first, one entry in flight at a time, and
//! retries a failing head entry at a fixed interval indefinitely. A
//! persistently failing head therefore stalls everything behind it: a
//! deliberate ordering/simplicity trade-off, not a bug.

use crate::store::QueueStore;
use crate::upstream::{Deliver, Outcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct Forwarder {
    store: Arc<QueueStore>,
    downstream: Arc<dyn Deliver>,
    poll_interval: Duration,
    retry_interval: Duration,
}

/// What one iteration did, deciding how long to wait before the next.
enum Step {
    /// Delivered and relocated one entry; go again immediately
    Drained,
    /// Nothing queued; wait the poll interval
    Empty,
    /// Delivery or store trouble; leave the entry and wait the retry interval
    Failed,
}

impl Forwarder {
    pub fn new(
        store: Arc<QueueStore>,
        downstream: Arc<dyn Deliver>,
        poll_interval: Duration,
        retry_interval: Duration,
    ) -> Self {
        Forwarder {
            store,
            downstream,
            poll_interval,
            retry_interval,
        }
    }

    /// Runs until the shutdown flag flips. The in-flight iteration always
    /// completes first, so an entry is never left half-relocated.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut idle_logged = false;
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Errors never escape an iteration; they are logged and
            // treated as a transient failure.
            let step = match self.forward_next(&mut idle_logged).await {
                Ok(step) => step,
                Err(e) => {
                    tracing::error!(error = %e, "forwarding iteration failed");
                    Step::Failed
                }
            };

            let delay = match step {
                Step::Drained => continue,
                Step::Empty => self.poll_interval,
                Step::Failed => self.retry_interval,
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("forwarder stopped");
    }

    async fn forward_next(&self, idle_logged: &mut bool) -> Result<Step, crate::errors::StoreError> {
        let pending = self.store.list_pending()?;
        let Some(entry) = pending.first() else {
            if !*idle_logged {
                tracing::info!("nothing in the queue");
                *idle_logged = true;
            }
            return Ok(Step::Empty);
        };
        *idle_logged = false;

        tracing::info!(items = pending.len(), "items in queue");
        tracing::debug!(entry = entry.name(), "sending entry");

        let payload = self.store.read_payload(entry)?;
        match self.downstream.deliver(entry.origin(), &payload).await {
            Outcome::Delivered(status) => {
                tracing::info!(entry = entry.name(), status, "delivered");
                self.store.complete(entry)?;
                Ok(Step::Drained)
            }
            Outcome::Rejected(status) => {
                tracing::error!(
                    entry = entry.name(),
                    status,
                    "status from downstream was not success"
                );
                Ok(Step::Failed)
            }
            Outcome::Unreachable(reason) => {
                tracing::error!(entry = entry.name(), %reason, "downstream unreachable");
                Ok(Step::Failed)
            }
        }
    }
}
