//! Upstream origin parsed from a route's `target` URL.

use std::fmt;

use url::{Host, Url};

/// Transport used to reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScheme {
    Http,
    Https,
}

/// A validated upstream origin: scheme, host, port and optional base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: TargetScheme,
    host: String,
    port: u16,
    ipv6: bool,
    base_path: String,
}

impl Target {
    /// Parse a target URL. `ws`/`wss` are treated as `http`/`https`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let url = Url::parse(input).map_err(|e| format!("invalid target URL '{}': {}", input, e))?;

        let scheme = match url.scheme() {
            "http" | "ws" => TargetScheme::Http,
            "https" | "wss" => TargetScheme::Https,
            other => return Err(format!("unsupported target scheme '{}'", other)),
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err("target URL must not contain credentials".to_string());
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err("target URL must not contain a query or fragment".to_string());
        }

        let (host, ipv6) = match url.host() {
            Some(Host::Domain(domain)) => (domain.to_string(), false),
            Some(Host::Ipv4(addr)) => (addr.to_string(), false),
            Some(Host::Ipv6(addr)) => (addr.to_string(), true),
            None => return Err(format!("target URL '{}' has no host", input)),
        };

        let port = url
            .port_or_known_default()
            .ok_or_else(|| format!("target URL '{}' has no port", input))?;

        Ok(Self {
            scheme,
            host,
            port,
            ipv6,
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == TargetScheme::Https
    }

    /// Host without brackets, suitable for DNS lookup and SNI.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host[:port]` as it belongs in a `Host` header. Default ports are omitted.
    pub fn authority(&self) -> String {
        let host = if self.ipv6 {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = match self.scheme {
            TargetScheme::Http => 80,
            TargetScheme::Https => 443,
        };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Join the base path with a rewritten request path and re-attach the query.
    pub fn upstream_path_and_query(&self, rewritten: &str, query: Option<&str>) -> String {
        let mut path = self.base_path.clone();
        if !rewritten.starts_with('/') {
            path.push('/');
        }
        path.push_str(rewritten);
        if let Some(query) = query {
            path.push('?');
            path.push_str(query);
        }
        path
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            TargetScheme::Http => "http",
            TargetScheme::Https => "https",
        };
        write!(f, "{}://{}{}", scheme, self.authority(), self.base_path)
    }
}
