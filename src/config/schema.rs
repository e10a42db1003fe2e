//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! Unknown keys are rejected so that a misspelled option fails loudly
//! instead of being silently ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the development proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Listener and fallback settings.
    pub server: ServerConfig,

    /// Proxy rules, matched in the order they appear.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Host name or address to bind.
    pub host: String,

    /// Port to bind. `0` picks an ephemeral port.
    pub port: u16,

    /// Seconds in-flight sessions may take to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,

    /// Directory served for requests that match no route.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            shutdown_grace_secs: 10,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// `host:port` form, used for logging.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A single proxy rule as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Route identifier for logging. Defaults to the prefix.
    #[serde(default)]
    pub name: Option<String>,

    /// Path prefix to match.
    pub prefix: String,

    /// Origin requests are forwarded to, e.g. `http://localhost:8081/`.
    pub target: String,

    /// Path rewrite rules, first match wins.
    #[serde(default)]
    pub rewrite: Vec<RewriteConfig>,

    /// Forward `Upgrade` handshakes (WebSocket) for this route.
    #[serde(default, alias = "ws")]
    pub upgrade_enabled: bool,

    /// Replace the `Host` header with the target authority.
    #[serde(default)]
    pub rewrite_host_header: bool,
}

impl RouteConfig {
    /// Rule for `prefix` → `target` that strips the prefix and forwards upgrades.
    pub fn strip_prefix(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            name: None,
            rewrite: vec![RewriteConfig {
                pattern: format!("^{}", regex::escape(&prefix)),
                replacement: String::new(),
            }],
            prefix,
            target: target.into(),
            upgrade_enabled: true,
            rewrite_host_header: false,
        }
    }

    /// Name used in logs.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.prefix)
    }
}

/// A `pattern` → `replacement` pair applied to the request path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteConfig {
    /// Regular expression matched at the start of the path, e.g. `^/api`.
    pub pattern: String,

    /// Text substituted for the match; `$1` and `${name}` expand captures.
    #[serde(default)]
    pub replacement: String,
}

/// Timeout configuration for upstream operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Budget for DNS, TCP connect and TLS handshake, in seconds.
    pub connect_secs: u64,

    /// Time to wait for the upstream response head, in seconds.
    pub response_secs: u64,

    /// Time budget for requests answered by the fallback, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            response_secs: 30,
            request_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
