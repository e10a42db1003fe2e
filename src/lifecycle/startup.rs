//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the configuration file (or defaults) and apply CLI overrides
//! - Validate the result and compile the route table
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Overrides are validated together with the file contents

use std::path::{Path, PathBuf};

use crate::config::loader::{load_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::ProxyConfig;
use crate::routing::RouteTable;

/// Settings given on the command line, taking precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = self.static_dir {
            config.server.static_dir = Some(dir);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

/// Load `path` (or the defaults) and apply `overrides`.
pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Compile the immutable route table for a validated config.
pub fn compile_routes(config: &ProxyConfig) -> Result<RouteTable, ConfigError> {
    RouteTable::from_config(&config.routes)
}
