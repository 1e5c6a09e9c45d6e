//! Core of the performance report pipeline.
//!
//! Reports arrive as JSON, are decoded into a typed [`Report`], enriched by
//! [`dispatch`], re-encoded, and pushed onto a bounded [`IndexQueue`]. A single
//! [`IndexingSink`] drains the queue into an [`IndexStore`].
//!
//! ```rust
//! use perfreport::{Report, ReportBody, dispatch};
//!
//! let body = br#"{"type":"adData","guid":"g1",
//!     "adData":{"adRequestStart":100.0,"adRequestEnd":142.5,"hasPreroll":true}}"#;
//! let mut report = Report::from_slice(body).unwrap();
//! dispatch(&mut report);
//!
//! let ReportBody::Ad(ad) = &report.body else { unreachable!() };
//! assert_eq!(ad.ad_request_delta, Some(42.5));
//! ```
//!
//! The HTTP surface lives in the `perfreport-server` crate.

pub mod config;
pub mod dispatch;
pub mod queue;
pub mod report;
pub mod sink;
pub mod store;

pub use config::{ConfigError, FailurePolicy, IndexConfig};
pub use dispatch::{Dispatch, dispatch};
pub use queue::{
    DEFAULT_QUEUE_CAPACITY, IndexQueue, IndexReceiver, IndexSender, QueueError, QueuedReport,
};
pub use report::{
    AD_DATA, ASSET_DATA, AdData, AssetData, ENV_DATA, EVENT_LOG, EnvData, EventLogItem, Preroll,
    Report, ReportBody, ReportError, UNRECOGNIZED,
};
pub use sink::{IndexingSink, SinkError, SinkReport};
pub use store::{
    ElasticsearchStore, IndexError, IndexStore, IndexedDocument, MemoryStore, StoreConfig,
    StoredDocument,
};

/// Decode, dispatch and re-encode one request body.
///
/// Returns the report ready for the index queue together with what the
/// dispatcher did to it.
pub fn prepare(body: &[u8]) -> Result<(QueuedReport, Dispatch), ReportError> {
    let mut report = Report::from_slice(body)?;
    let outcome = dispatch(&mut report);
    let encoded = report.to_bytes()?;
    Ok((QueuedReport::new(report.guid, outcome.label, encoded), outcome))
}
