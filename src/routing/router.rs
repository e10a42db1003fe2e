//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Compile route configs into rules
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan in configured order (acceptable for typical route counts)
//! - Explicit no-match (`None`) rather than silent default

use std::sync::Arc;

use axum::http::uri::PathAndQuery;

use crate::config::{ConfigError, RouteConfig, ValidationError};
use crate::routing::matcher::PathPrefixMatcher;
use crate::routing::rewrite::{rewrite_path, RewriteRule};
use crate::routing::target::Target;

/// A compiled proxy rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub name: String,
    pub matcher: PathPrefixMatcher,
    pub target: Target,
    pub rewrites: Vec<RewriteRule>,
    pub upgrade_enabled: bool,
    pub rewrite_host_header: bool,
}

impl RouteRule {
    /// Compile the `index`-th route config, reporting every problem found.
    pub fn compile(index: usize, config: &RouteConfig) -> Result<Self, Vec<ValidationError>> {
        let field = |name: &str| format!("routes[{}].{}", index, name);
        let mut errors = Vec::new();

        if config.prefix.is_empty() {
            errors.push(ValidationError::new(field("prefix"), "must not be empty"));
        } else if !config.prefix.starts_with('/') {
            errors.push(ValidationError::new(
                field("prefix"),
                format!("'{}' must start with '/'", config.prefix),
            ));
        }

        let target = Target::parse(&config.target)
            .map_err(|message| errors.push(ValidationError::new(field("target"), message)))
            .ok();

        let mut rewrites = Vec::with_capacity(config.rewrite.len());
        for (i, rewrite) in config.rewrite.iter().enumerate() {
            match RewriteRule::parse(&rewrite.pattern, rewrite.replacement.as_str()) {
                Ok(rule) => rewrites.push(rule),
                Err(message) => errors.push(ValidationError::new(
                    format!("routes[{}].rewrite[{}].pattern", index, i),
                    message,
                )),
            }
        }

        if let Some(target) = &target {
            for (i, rewrite) in config.rewrite.iter().enumerate() {
                let upstream = target.upstream_path_and_query(&rewrite.replacement, None);
                if let Err(e) = upstream.parse::<PathAndQuery>() {
                    errors.push(ValidationError::new(
                        format!("routes[{}].rewrite[{}].replacement", index, i),
                        format!("'{}' cannot appear in a request URI: {}", rewrite.replacement, e),
                    ));
                }
            }
        }

        match target {
            Some(target) if errors.is_empty() => Ok(Self {
                name: config.display_name().to_string(),
                matcher: PathPrefixMatcher::new(config.prefix.as_str()),
                target,
                rewrites,
                upgrade_enabled: config.upgrade_enabled,
                rewrite_host_header: config.rewrite_host_header,
            }),
            _ => Err(errors),
        }
    }

    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }

    /// Rewritten path, not yet joined with the target base path.
    pub fn rewrite(&self, path: &str) -> String {
        rewrite_path(path, &self.rewrites)
    }

    /// Origin-form URI to send upstream for a request to `path?query`.
    pub fn upstream_path_and_query(&self, path: &str, query: Option<&str>) -> String {
        self.target
            .upstream_path_and_query(&self.rewrite(path), query)
    }
}

/// Ordered, immutable set of proxy rules.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<Arc<RouteRule>>,
}

impl RouteTable {
    /// Compile routes, preserving configured order.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(routes.len());
        let mut errors = Vec::new();

        for (index, route) in routes.iter().enumerate() {
            match RouteRule::compile(index, route) {
                Ok(rule) => {
                    tracing::debug!(
                        route = %rule.name,
                        prefix = %rule.prefix(),
                        target = %rule.target,
                        upgrade_enabled = rule.upgrade_enabled,
                        rewrites = ?rule.rewrites.iter().map(|r| r.pattern()).collect::<Vec<_>>(),
                        "Route compiled"
                    );
                    rules.push(Arc::new(rule));
                }
                Err(route_errors) => errors.extend(route_errors),
            }
        }

        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(Self { rules })
    }

    /// First rule, in configured order, whose prefix matches `path`.
    pub fn match_path(&self, path: &str) -> Option<&Arc<RouteRule>> {
        self.rules.iter().find(|rule| rule.matcher.matches(path))
    }

    pub fn rules(&self) -> &[Arc<RouteRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
