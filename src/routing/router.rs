//! Static route lookup.
//!
//! # Responsibilities
//! - Store compiled static routes and gateway-reserved patterns
//! - Decide per path: gateway pipeline or static origin
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Reserved gateway patterns are checked first; static routing never shadows them
//! - O(n) ordered scan, first match wins (most-specific-first configuration)

use crate::config::{StaticContentConfig, StaticRouteConfig};
use crate::routing::matcher::PathPattern;

/// Where a static route forwards to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyTarget {
    /// Origin URL (scheme + host), parsed per request.
    pub service_host: String,
    /// Forward hop-by-hop headers instead of stripping them.
    pub keep_unsafe_headers: bool,
}

#[derive(Debug, Clone)]
struct StaticRoute {
    pattern: PathPattern,
    target: ProxyTarget,
}

/// Outcome of a routing decision.
#[derive(Debug, PartialEq)]
pub enum Dispatch<'a> {
    /// Continue into the gateway pipeline.
    Gateway,
    /// Reverse-proxy to a static origin.
    Static(&'a ProxyTarget),
}

/// Ordered static routes plus the gateway-reserved set.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<StaticRoute>,
    reserved: Vec<PathPattern>,
}

impl RouteTable {
    /// Compile a route table from configuration.
    pub fn from_config(config: &StaticContentConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .map(|r: &StaticRouteConfig| StaticRoute {
                pattern: PathPattern::new(r.path_prefix.clone()),
                target: ProxyTarget {
                    service_host: r.service_host.clone(),
                    keep_unsafe_headers: r.keep_unsafe_headers,
                },
            })
            .collect();

        let reserved = config
            .service_gateway
            .path_prefix
            .iter()
            .map(|p| PathPattern::new(p.clone()))
            .collect();

        Self { routes, reserved }
    }

    /// True when no static routes are configured.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// True if `path` belongs to the gateway by configuration.
    pub fn is_reserved(&self, path: &str) -> bool {
        self.reserved.iter().any(|p| p.matches(path))
    }

    /// Decide where `path` goes.
    pub fn dispatch(&self, path: &str) -> Dispatch<'_> {
        if self.is_reserved(path) {
            return Dispatch::Gateway;
        }

        self.routes
            .iter()
            .find(|r| r.pattern.matches(path))
            .map(|r| Dispatch::Static(&r.target))
            .unwrap_or(Dispatch::Gateway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServiceGatewayConfig, StaticRouteConfig};

    fn route(prefix: &str, host: &str) -> StaticRouteConfig {
        StaticRouteConfig {
            path_prefix: prefix.into(),
            service_host: host.into(),
            keep_unsafe_headers: false,
        }
    }

    fn table(routes: Vec<StaticRouteConfig>, reserved: &[&str]) -> RouteTable {
        RouteTable::from_config(&StaticContentConfig {
            routes,
            service_gateway: ServiceGatewayConfig {
                path_prefix: reserved.iter().map(|s| s.to_string()).collect(),
            },
        })
    }

    fn static_host<'a>(d: Dispatch<'a>) -> Option<&'a str> {
        match d {
            Dispatch::Static(t) => Some(t.service_host.as_str()),
            Dispatch::Gateway => None,
        }
    }

    #[test]
    fn test_reserved_wins_over_static() {
        let t = table(vec![route("/*", "http://web")], &["/api/*"]);
        assert_eq!(t.dispatch("/api/users"), Dispatch::Gateway);
        assert_eq!(static_host(t.dispatch("/index.html")), Some("http://web"));
        assert_eq!(static_host(t.dispatch("/")), Some("http://web"));
    }

    #[test]
    fn test_first_match_wins() {
        let t = table(
            vec![route("/assets/img/*", "http://images"), route("/assets/*", "http://cdn")],
            &[],
        );
        assert_eq!(static_host(t.dispatch("/assets/img/logo.png")), Some("http://images"));
        assert_eq!(static_host(t.dispatch("/assets/app.js")), Some("http://cdn"));
    }

    #[test]
    fn test_no_match_goes_to_gateway() {
        let t = table(vec![route("/assets/*", "http://cdn")], &[]);
        assert_eq!(t.dispatch("/other"), Dispatch::Gateway);
        assert_eq!(t.dispatch("/assets/../secret"), Dispatch::Gateway);
    }

    #[test]
    fn test_empty_table() {
        let t = RouteTable::default();
        assert!(t.is_empty());
        assert_eq!(t.dispatch("/anything"), Dispatch::Gateway);
    }
}
