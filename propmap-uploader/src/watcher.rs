//! Watch loop
//!
//! Each cycle scans the watched directories and submits every file whose
//! content signature differs from the last one delivered. A failed send
//! leaves the send-state untouched, so the file is simply retried next
//! cycle. Only send-state I/O failures end the loop.

use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scanner::{read_candidate, LogScanner};
use crate::state::SendStateStore;
use crate::submitter::{LogSubmitter, SubmitOutcome};
use crate::Result;

/// Per-cycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    /// Accepted by the server
    pub sent: usize,
    /// Server already had the content
    pub duplicates: usize,
    /// Read or submit failed; retried next cycle
    pub failed: usize,
    /// Signature matched the last delivery
    pub unchanged: usize,
}

pub struct Watcher<S> {
    scanner: LogScanner,
    state: SendStateStore,
    submitter: S,
}

impl<S: LogSubmitter> Watcher<S> {
    pub fn new(scanner: LogScanner, state: SendStateStore, submitter: S) -> Self {
        Self {
            scanner,
            state,
            submitter,
        }
    }

    pub fn state(&self) -> &SendStateStore {
        &self.state
    }

    /// Run one scan-and-submit pass
    ///
    /// Cancellation is checked between files; a send already in progress
    /// finishes and its state update is flushed.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        for path in self.scanner.scan() {
            if cancel.is_cancelled() {
                debug!("Cycle cancelled");
                break;
            }
            report.scanned += 1;

            let candidate = match read_candidate(&path).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!("{}", e);
                    report.failed += 1;
                    continue;
                }
            };

            if !self.state.needs_send(&candidate.path, &candidate.signature) {
                report.unchanged += 1;
                continue;
            }

            match self.submitter.submit(&candidate.path, candidate.body).await {
                Ok(outcome) => {
                    self.state
                        .record(&candidate.path, &candidate.signature, Utc::now())
                        .await?;
                    match outcome {
                        SubmitOutcome::Accepted { contacts_written } => {
                            info!(file = %path.display(), contacts_written, "Log delivered");
                            report.sent += 1;
                        }
                        SubmitOutcome::Duplicate => {
                            info!(file = %path.display(), "Log already on server");
                            report.duplicates += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(file = %path.display(), "Send failed, will retry: {}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run cycles every `interval` until cancelled
    pub async fn run(&mut self, interval: Duration, cancel: CancellationToken) -> Result<()> {
        info!(
            "Watching {} directories every {:?}",
            self.scanner.dirs().len(),
            interval
        );

        loop {
            let report = self.run_cycle(&cancel).await?;
            if report.sent + report.duplicates + report.failed > 0 {
                info!(
                    scanned = report.scanned,
                    sent = report.sent,
                    duplicates = report.duplicates,
                    failed = report.failed,
                    unchanged = report.unchanged,
                    "Cycle complete"
                );
            } else {
                debug!(scanned = report.scanned, "Cycle complete, nothing new");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Watcher stopped");
        Ok(())
    }
}
