use crate::config::ServerConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use perfreport::IndexSender;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Process-wide Prometheus recorder. `metrics` allows one global recorder,
/// so it is installed at most once no matter how many states are built.
static PROMETHEUS: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Producer half of the index queue (one clone per request)
    pub queue: IndexSender,

    /// Prometheus render handle, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl ServerState {
    /// Create new server state around an already-built index queue
    pub fn new(config: ServerConfig, queue: IndexSender) -> Self {
        let metrics = if config.metrics_enabled {
            prometheus_handle()
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            queue,
            metrics,
        }
    }

    /// Reports waiting for the indexing sink
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// The sink is gone once the receiver half is dropped
    pub fn is_ready(&self) -> bool {
        !self.queue.is_closed()
    }
}

fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!("Metrics recorder not installed: {err}");
                None
            }
        })
        .clone()
}
