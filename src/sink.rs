//! The indexing sink: a single worker draining the index queue into the store.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{FailurePolicy, IndexConfig};
use crate::queue::{IndexReceiver, QueuedReport};
use crate::store::{IndexError, IndexStore, IndexedDocument};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("failed to index report {guid}: {source}")]
    IndexWrite {
        guid: String,
        #[source]
        source: IndexError,
    },
}

/// Totals reported when the sink stops after the queue drains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub indexed: u64,
    pub dead_lettered: u64,
}

/// Owns the consumer half of the queue and writes every report, in order,
/// to `index_name`/`category`.
pub struct IndexingSink {
    store: Arc<dyn IndexStore>,
    receiver: IndexReceiver,
    index_name: String,
    category: String,
    policy: FailurePolicy,
}

impl IndexingSink {
    pub fn new(store: Arc<dyn IndexStore>, receiver: IndexReceiver, config: &IndexConfig) -> Self {
        Self {
            store,
            receiver,
            index_name: config.index_name.clone(),
            category: config.category.clone(),
            policy: config.on_failure,
        }
    }

    /// Run the sink on its own task.
    pub fn spawn(self) -> JoinHandle<Result<SinkReport, SinkError>> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until every sender is gone.
    ///
    /// Under [`FailurePolicy::Abort`] the first failed write ends the loop
    /// with an error; nothing is retried or put back.
    pub async fn run(mut self) -> Result<SinkReport, SinkError> {
        info!(
            index = %self.index_name,
            category = %self.category,
            policy = ?self.policy,
            "Indexing sink started"
        );

        let mut totals = SinkReport::default();
        while let Some(report) = self.receiver.dequeue().await {
            match self.write(&report).await {
                Ok(doc) => {
                    totals.indexed += 1;
                    metrics::counter!("perfreport_reports_indexed_total").increment(1);
                    debug!(
                        guid = %report.guid,
                        kind = report.label,
                        id = doc.id.as_deref().unwrap_or(""),
                        "Report indexed"
                    );
                }
                Err(err) => {
                    metrics::counter!("perfreport_index_failures_total").increment(1);
                    match self.policy {
                        FailurePolicy::Abort => {
                            error!(
                                guid = %report.guid,
                                kind = report.label,
                                error = %err,
                                "Index write failed, stopping sink"
                            );
                            self.receiver.close();
                            return Err(SinkError::IndexWrite {
                                guid: report.guid,
                                source: err,
                            });
                        }
                        FailurePolicy::Retry { .. } => {
                            totals.dead_lettered += 1;
                            metrics::counter!("perfreport_reports_dead_lettered_total")
                                .increment(1);
                            error!(
                                guid = %report.guid,
                                kind = report.label,
                                error = %err,
                                payload = %String::from_utf8_lossy(&report.body),
                                "Dead-lettered report after exhausting retries"
                            );
                        }
                    }
                }
            }
        }

        info!(
            indexed = totals.indexed,
            dead_lettered = totals.dead_lettered,
            "Index queue closed and drained, sink stopping"
        );
        Ok(totals)
    }

    async fn write(&self, report: &QueuedReport) -> Result<IndexedDocument, IndexError> {
        let mut attempt = 0;
        loop {
            let result = self
                .store
                .index_document(&self.index_name, &self.category, report.body.clone())
                .await;

            let err = match result {
                Ok(doc) => return Ok(doc),
                Err(err) => err,
            };

            let Some(delay) = self.policy.backoff(attempt) else {
                return Err(err);
            };
            if attempt >= self.policy.max_retries() {
                return Err(err);
            }

            warn!(
                guid = %report.guid,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Index write failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
