//! TOML configuration.
//!
//! ```toml
//! root = "data/stock_info"
//! offline = false
//!
//! [fetch]
//! min_request_interval_ms = 500
//! max_retries = 3
//!
//! [provider]
//! base_url = "http://127.0.0.1:8080/api"
//! import_dir = "imports"
//!
//! [policy.financials]
//! ttl_days = 14
//! ```
//!
//! Every section is optional. `[policy.<kind>]` tables override the default
//! registry; a table naming an unknown kind is a configuration error.

use crate::data::registry::{CacheRegistry, CacheRegistryBuilder};
use crate::data::retry::RetryPolicy;
use crate::domain::{CacheKind, Lookback};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub min_request_interval_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub circuit_breaker_cooldown_secs: u64,
    pub circuit_breaker_threshold: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: 500,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            request_timeout_secs: 30,
            circuit_breaker_cooldown_secs: 30 * 60,
            circuit_breaker_threshold: 3,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: true,
        }
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn circuit_breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_cooldown_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// HTTP/JSON provider endpoint.
    pub base_url: Option<String>,
    /// CSV export directory; price fallback when `base_url` is set.
    pub import_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Per-kind policy override. Unset fields keep the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyOverride {
    pub ttl_hours: Option<u64>,
    pub ttl_days: Option<u64>,
    /// Directory name under the entity (or root, for global kinds).
    pub subdir: Option<String>,
    pub acquisition_lookback_days: Option<u32>,
    pub consumption_window_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    pub root: PathBuf,
    pub offline: bool,
    pub fetch: FetchConfig,
    pub provider: ProviderConfig,
    pub batch: BatchConfig,
    pub policy: BTreeMap<String, PolicyOverride>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/stock_info"),
            offline: false,
            fetch: FetchConfig::default(),
            provider: ProviderConfig::default(),
            batch: BatchConfig::default(),
            policy: BTreeMap::new(),
        }
    }
}

impl AccessConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Default registry at `root` with every `[policy.*]` override applied.
    pub fn build_registry(&self) -> Result<CacheRegistry, ConfigError> {
        let mut builder = CacheRegistryBuilder::with_defaults(&self.root);
        for (name, overlay) in &self.policy {
            let kind: CacheKind = name.parse()?;
            let mut spec = builder
                .spec(kind)
                .cloned()
                .ok_or(ConfigError::UnknownKind(kind))?;

            let invalid = |reason: &str| ConfigError::InvalidOverride {
                kind: name.clone(),
                reason: reason.to_string(),
            };

            match (overlay.ttl_hours, overlay.ttl_days) {
                (Some(_), Some(_)) => return Err(invalid("set ttl_hours or ttl_days, not both")),
                (Some(h), None) => {
                    spec.ttl_secs = h.checked_mul(3600).ok_or_else(|| invalid("ttl_hours overflows"))?;
                }
                (None, Some(d)) => {
                    spec.ttl_secs = d.checked_mul(86_400).ok_or_else(|| invalid("ttl_days overflows"))?;
                }
                (None, None) => {}
            }
            if let Some(subdir) = &overlay.subdir {
                let subdir = subdir.trim().trim_matches('/');
                if subdir.is_empty() {
                    return Err(invalid("subdir must not be empty"));
                }
                spec.path_template = if spec.per_entity {
                    format!("{{entity}}/{subdir}")
                } else {
                    subdir.to_string()
                };
            }
            if let Some(days) = overlay.acquisition_lookback_days {
                if kind == CacheKind::SecurityList {
                    return Err(invalid("security list has no acquisition window"));
                }
                spec.acquisition_lookback = Some(Lookback::Days(days));
            }
            if let Some(days) = overlay.consumption_window_days {
                if kind != CacheKind::Disclosures {
                    return Err(invalid("only disclosures have a consumption window"));
                }
                spec.consumption_window_days = Some(days);
            }
            builder.override_spec(spec)?;
        }
        Ok(builder.build())
    }
}
