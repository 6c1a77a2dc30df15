//! HTTP/JSON market data provider.
//!
//! `GET {base_url}/{dataset}?symbol=CODE.SUFFIX&start=YYYYMMDD&end=YYYYMMDD`
//! answers `{"rows": [{...}, ...]}` or `{"error": {"code": ..., "description": ...}}`.
//! Scalar cell values are stringified; nulls are dropped.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{MarketDataProvider, TableRequest};
use crate::domain::Record;
use crate::error::ProviderError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TableResponse {
    rows: Option<Vec<BTreeMap<String, serde_json::Value>>>,
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    code: String,
    #[serde(default)]
    description: String,
}

pub struct HttpJsonProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpJsonProvider {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("asof/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            circuit_breaker,
        })
    }

    fn table_url(&self, dataset: &str) -> String {
        format!("{}/{dataset}", self.base_url)
    }

    fn parse_response(request: &TableRequest<'_>, resp: TableResponse) -> Result<Vec<Record>, ProviderError> {
        if let Some(err) = resp.error {
            return Err(match err.code.as_str() {
                "not_found" | "Not Found" => ProviderError::EntityNotFound {
                    symbol: request.entity.symbol(),
                    dataset: request.dataset.to_string(),
                },
                _ => ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
            });
        }
        let rows = resp
            .rows
            .ok_or_else(|| ProviderError::ResponseFormatChanged("response has neither rows nor error".into()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter_map(|(k, v)| cell_to_string(v).map(|s| (k, s)))
                    .collect()
            })
            .collect())
    }
}

fn cell_to_string(v: serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl MarketDataProvider for HttpJsonProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch_table(&self, request: &TableRequest<'_>) -> Result<Vec<Record>, ProviderError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped);
        }
        let start = request.window.start().format("%Y%m%d").to_string();
        let end = request.window.end().format("%Y%m%d").to_string();
        let symbol = request.entity.symbol();

        let result = self
            .client
            .get(self.table_url(request.dataset))
            .query(&[("symbol", symbol.as_str()), ("start", start.as_str()), ("end", end.as_str())])
            .send();

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                self.circuit_breaker.record_failure();
                return Err(if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::NetworkUnreachable(e.to_string())
                });
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            return Err(ProviderError::CircuitBreakerTripped);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthenticationRequired(format!(
                "{} requires authentication",
                self.base_url
            )));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::EntityNotFound {
                symbol,
                dataset: request.dataset.to_string(),
            });
        }
        if status.is_server_error() {
            self.circuit_breaker.record_failure();
            return Err(ProviderError::ServerError {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Other(format!("HTTP {status} for {symbol}")));
        }

        let body: TableResponse = resp.json().map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;
        let records = Self::parse_response(request, body)?;
        self.circuit_breaker.record_success();
        Ok(records)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
