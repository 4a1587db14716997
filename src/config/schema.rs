//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Outbound connections to static origins and backends.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Static content routing in front of the gateway pipeline.
    pub static_content: StaticContentConfig,

    /// Gateway endpoints.
    pub endpoints: Vec<EndpointConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default per-backend timeout for aggregate endpoints, in seconds.
    pub backend_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { backend_secs: 3 }
    }
}

/// Outbound connection settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// PEM bundle trusted for `https` origins and backends, on top of the system roots.
    pub ca_cert_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Static content routing, keyed the same way as the plugin mapping it replaces.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct StaticContentConfig {
    /// Ordered static routes. First match wins.
    #[serde(rename = "static")]
    pub routes: Vec<StaticRouteConfig>,

    /// Paths that always belong to the gateway.
    #[serde(rename = "service-gateway")]
    pub service_gateway: ServiceGatewayConfig,
}

impl StaticContentConfig {
    /// Decode from an opaque JSON mapping, e.g. a per-endpoint extra config block.
    pub fn from_extra(value: &serde_json::Value) -> Result<Self, ConfigError> {
        Self::deserialize(value).map_err(ConfigError::Extra)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StaticRouteConfig {
    /// Path pattern, e.g. `/assets/*`.
    pub path_prefix: String,

    /// Origin URL, e.g. `http://web:3000`.
    pub service_host: String,

    /// Forward hop-by-hop headers instead of stripping them.
    #[serde(default)]
    pub keep_unsafe_headers: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServiceGatewayConfig {
    pub path_prefix: Vec<String>,
}

/// Gateway endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Route path in axum syntax (e.g. `/api/users/{id}`).
    pub path: String,

    /// HTTP method. `None` accepts any method.
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub kind: EndpointKind,

    /// Per-backend timeout override (aggregate endpoints only).
    #[serde(default)]
    pub timeout: Option<String>,

    /// SSE settings (sse endpoints only).
    #[serde(default)]
    pub sse: Option<SseOptions>,

    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Call every backend and merge the results.
    #[default]
    Aggregate,
    /// Stream a single backend as Server-Sent Events.
    Sse,
}

/// Raw SSE options as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SseOptions {
    pub keep_alive_interval: Option<String>,
    /// Client reconnect hint in milliseconds.
    pub retry_interval: Option<i64>,
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendConfig {
    /// Backend origin (e.g., "http://127.0.0.1:3000").
    pub host: String,

    /// Path on the backend. Defaults to the inbound path.
    #[serde(default)]
    pub url_pattern: Option<String>,

    /// Nest this backend's data under the given key.
    #[serde(default)]
    pub group: Option<String>,

    /// Report failed calls as data under this key instead of dropping them.
    #[serde(default)]
    pub error_namespace: Option<String>,
}

impl BackendConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            url_pattern: None,
            group: None,
            error_namespace: None,
        }
    }
}

/// Parse a duration such as `250ms`, `30s`, `5m` or `1h`. Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::Duration(s.to_string());

    let (digits, unit_ms): (&str, u64) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}
