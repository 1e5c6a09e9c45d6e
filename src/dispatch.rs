//! Type-keyed enrichment of decoded reports.
//!
//! [`dispatch`] never fails: unknown report types pass through untouched.

use crate::report::{Report, ReportBody};
use tracing::{debug, info, warn};

/// What [`dispatch`] did to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Bounded type label (see [`Report::label`]).
    pub label: &'static str,
    /// True when a server-derived field was written.
    pub enriched: bool,
}

/// Apply type-specific enrichment in place.
///
/// Only `adData` reports with a preroll are mutated: `adRequestDelta` is set
/// to `adRequestEnd - adRequestStart`. Negative deltas come from client clock
/// skew and are kept as-is. A span that overflows to infinity leaves the
/// delta unset.
pub fn dispatch(report: &mut Report) -> Dispatch {
    let label = report.label();
    let guid = report.guid.as_str();

    let enriched = match &mut report.body {
        ReportBody::Env(env) => {
            info!(guid, user_agent = %env.user_agent, "env report");
            false
        }
        ReportBody::Ad(ad) if ad.has_preroll => {
            let delta = ad.request_span();
            if delta.is_finite() {
                ad.ad_request_delta = Some(delta);
                info!(guid, delta, "ad report");
                true
            } else {
                warn!(
                    guid,
                    start = ad.ad_request_start,
                    end = ad.ad_request_end,
                    "ad request span is not finite, delta left unset"
                );
                false
            }
        }
        ReportBody::Ad(_) => {
            debug!(guid, "ad report without preroll");
            false
        }
        ReportBody::Asset(_) => {
            info!(guid, "asset report");
            false
        }
        ReportBody::EventLog(items) => {
            info!(guid, events = items.len(), "event log report");
            false
        }
        ReportBody::Unrecognized(tag) => {
            debug!(guid, kind = %tag, "unrecognized report type, passing through");
            false
        }
    };

    Dispatch { label, enriched }
}
