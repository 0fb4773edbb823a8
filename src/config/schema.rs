//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Default query parameter carrying the transformer flags.
pub const DEFAULT_TRANSFORMER_QUERY_PARAMETER: &str = "transformer";

/// Default key the raw body is wrapped under.
pub const DEFAULT_JSON_FIELD_NAME: &str = "data";

/// Default query parameter holding the bearer token.
pub const DEFAULT_TOKEN_QUERY_PARAMETER: &str = "token";

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream the transformed requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request transformer middleware settings.
    pub middleware: MiddlewareConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream (e.g., "http://127.0.0.1:3000").
    /// Only scheme and authority are used; the request path and query are kept.
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
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

/// Middleware instance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Instance name, used as the prefix of diagnostic lines.
    pub name: String,

    /// Transformer options.
    pub transformer: TransformerConfig,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            name: "query-transformer".to_string(),
            transformer: TransformerConfig::default(),
        }
    }
}

/// Options of the request transformer.
///
/// Keys keep the camelCase names used by existing plugin configurations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformerConfig {
    /// Query parameter carrying the `|`-separated flags.
    pub transformer_query_parameter_name: String,

    /// Key the raw body is wrapped under by the `body` flag.
    pub json_transform_field_name: String,

    /// Query parameter holding the token used by the `bearer` flag.
    pub token_transform_query_parameter_field_name: String,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            transformer_query_parameter_name: DEFAULT_TRANSFORMER_QUERY_PARAMETER.to_string(),
            json_transform_field_name: DEFAULT_JSON_FIELD_NAME.to_string(),
            token_transform_query_parameter_field_name: DEFAULT_TOKEN_QUERY_PARAMETER.to_string(),
        }
    }
}

impl TransformerConfig {
    /// Replace empty options with their defaults.
    pub fn normalized(mut self) -> Self {
        fn fill(value: &mut String, default: &str) {
            if value.is_empty() {
                *value = default.to_string();
            }
        }

        fill(
            &mut self.transformer_query_parameter_name,
            DEFAULT_TRANSFORMER_QUERY_PARAMETER,
        );
        fill(&mut self.json_transform_field_name, DEFAULT_JSON_FIELD_NAME);
        fill(
            &mut self.token_transform_query_parameter_field_name,
            DEFAULT_TOKEN_QUERY_PARAMETER,
        );
        self
    }
}
