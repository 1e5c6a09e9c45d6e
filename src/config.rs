//! Indexing configuration.
//!
//! Loaded as the `index` section of the server configuration:
//!
//! ```yaml
//! index:
//!   index_name: "reports"
//!   category: "performance"
//!   backend:
//!     kind: "elasticsearch"
//!     url: "http://localhost:9200"
//!     request_timeout_secs: 30
//!   on_failure:
//!     policy: "retry"
//!     max_retries: 5
//!     base_delay_ms: 200
//!     max_delay_ms: 10000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(String),
}

/// Where and how reports are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index store backend
    #[serde(default)]
    pub backend: StoreConfig,

    /// Index every report is written to
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Document category (mapping type) within the index
    #[serde(default = "default_category")]
    pub category: String,

    /// What the sink does when a write fails
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: StoreConfig::default(),
            index_name: default_index_name(),
            category: default_category(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl IndexConfig {
    pub fn with_backend(mut self, backend: StoreConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "index.index_name must not be empty".into(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(ConfigError::Validation(
                "index.category must not be empty".into(),
            ));
        }
        if let StoreConfig::Elasticsearch { url, .. } = &self.backend {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "index.backend.url must be an http(s) url, got {url:?}"
                )));
            }
        }
        if let FailurePolicy::Retry {
            base_delay_ms,
            max_delay_ms,
            ..
        } = self.on_failure
        {
            if base_delay_ms > max_delay_ms {
                return Err(ConfigError::Validation(
                    "index.on_failure.base_delay_ms must not exceed max_delay_ms".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Sink behaviour on a failed index write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the sink on the first failure. The server treats this as fatal.
    #[default]
    Abort,
    /// Retry with exponential backoff, then dead-letter the report and move on.
    Retry {
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        #[serde(default = "default_base_delay_ms")]
        base_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
}

impl FailurePolicy {
    pub fn retry() -> Self {
        FailurePolicy::Retry {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`,
    /// capped at `max_delay_ms`. `None` for [`FailurePolicy::Abort`].
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        match *self {
            FailurePolicy::Abort => None,
            FailurePolicy::Retry {
                base_delay_ms,
                max_delay_ms,
                ..
            } => {
                let factor = 2u64.saturating_pow(attempt);
                let delay = base_delay_ms.saturating_mul(factor).min(max_delay_ms);
                Some(Duration::from_millis(delay))
            }
        }
    }

    pub fn max_retries(&self) -> u32 {
        match *self {
            FailurePolicy::Abort => 0,
            FailurePolicy::Retry { max_retries, .. } => max_retries,
        }
    }
}

fn default_index_name() -> String {
    "reports".to_string()
}

fn default_category() -> String {
    "performance".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}
