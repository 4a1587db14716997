//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and addresses
//! - Detect conflicting endpoints and paths the router would refuse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Static origins and SSE backends are checked per request, not here
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::Method;
use axum::routing::MethodFilter;
use thiserror::Error;

use crate::config::schema::{parse_duration, EndpointConfig, EndpointKind, GatewayConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("timeouts.backend_secs must be greater than zero")]
    ZeroBackendTimeout,

    #[error("endpoint {0:?} has a zero timeout")]
    ZeroEndpointTimeout(String),

    #[error("endpoint path {0:?} must start with '/' and use {{param}} or {{*rest}} captures")]
    EndpointPath(String),

    #[error("endpoint path {path:?} cannot be routed: {reason}")]
    RouteConflict { path: String, reason: String },

    #[error("endpoint {path} has unsupported method {method:?}")]
    Method { method: String, path: String },

    #[error("endpoint {method} {path} is declared more than once")]
    DuplicateEndpoint { method: String, path: String },

    #[error("endpoint {0:?} has sse settings but is not an sse endpoint")]
    SseOnAggregate(String),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.timeouts.backend_secs == 0 {
        errors.push(ValidationError::ZeroBackendTimeout);
    }

    let mut routes = RouteRegistry::new();
    for endpoint in &config.endpoints {
        errors.extend(routes.admit(endpoint));

        // Unparsable values answer 400 per request instead.
        if let Some(raw) = &endpoint.timeout {
            if parse_duration(raw).is_ok_and(|t| t.is_zero()) {
                errors.push(ValidationError::ZeroEndpointTimeout(endpoint.path.clone()));
            }
        }

        if endpoint.kind != EndpointKind::Sse && endpoint.sse.is_some() {
            errors.push(ValidationError::SseOnAggregate(endpoint.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Endpoint paths and methods accepted so far, checked with the same rules
/// the axum router applies when a route is added.
pub struct RouteRegistry<'a> {
    paths: matchit::Router<()>,
    /// Methods registered per path; `None` stands for any method.
    methods: HashMap<&'a str, Vec<Option<String>>>,
}

impl<'a> RouteRegistry<'a> {
    pub fn new() -> Self {
        Self {
            paths: matchit::Router::new(),
            methods: HashMap::new(),
        }
    }

    /// Register `endpoint`. An empty result means the router accepts it.
    pub fn admit(&mut self, endpoint: &'a EndpointConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let path = endpoint.path.as_str();

        let method = endpoint.method.as_deref().map(str::to_ascii_uppercase);
        if let Some(m) = &method {
            if !is_routable_method(m) {
                errors.push(ValidationError::Method {
                    method: m.clone(),
                    path: path.to_string(),
                });
            }
        }

        if let Some(registered) = self.methods.get_mut(path) {
            let overlaps = registered
                .iter()
                .any(|r| r.is_none() || method.is_none() || *r == method);
            if overlaps {
                errors.push(ValidationError::DuplicateEndpoint {
                    method: method.clone().unwrap_or_else(|| "ANY".to_string()),
                    path: path.to_string(),
                });
            } else {
                registered.push(method);
            }
            return errors;
        }

        if !is_axum_path(path) {
            errors.push(ValidationError::EndpointPath(path.to_string()));
        } else if let Err(e) = self.paths.insert(path, ()) {
            errors.push(ValidationError::RouteConflict {
                path: path.to_string(),
                reason: e.to_string(),
            });
        } else {
            self.methods.insert(path, vec![method]);
        }
        errors
    }
}

impl Default for RouteRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Leading slash, and no `:param` / `*rest` segments from older axum releases.
fn is_axum_path(path: &str) -> bool {
    path.starts_with('/')
        && !path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
}

fn is_routable_method(method: &str) -> bool {
    Method::from_bytes(method.as_bytes())
        .ok()
        .and_then(|m| MethodFilter::try_from(m).ok())
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EndpointConfig, SseOptions};

    fn endpoint(path: &str) -> EndpointConfig {
        EndpointConfig {
            path: path.to_string(),
            method: None,
            kind: EndpointKind::Aggregate,
            timeout: None,
            sse: None,
            backends: Vec::new(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "localhost".into();
        config.timeouts.backend_secs = 0;
        config.endpoints.push(endpoint("users"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroBackendTimeout));
    }

    #[test]
    fn test_duplicate_endpoints() {
        let mut config = GatewayConfig::default();
        let mut get = endpoint("/api/users");
        get.method = Some("get".into());
        let mut get_again = endpoint("/api/users");
        get_again.method = Some("GET".into());
        let mut post = endpoint("/api/users");
        post.method = Some("POST".into());
        config.endpoints = vec![get, get_again, post];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateEndpoint {
                method: "GET".into(),
                path: "/api/users".into(),
            }]
        );
    }

    #[test]
    fn test_sse_settings_on_aggregate_endpoint() {
        let mut config = GatewayConfig::default();
        let mut e = endpoint("/api/feed");
        e.sse = Some(SseOptions::default());
        config.endpoints.push(e);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::SseOnAggregate("/api/feed".into())]);
    }

    #[test]
    fn test_any_method_overlaps_specific_method() {
        let mut config = GatewayConfig::default();
        let mut get = endpoint("/api/users");
        get.method = Some("GET".into());
        config.endpoints = vec![get, endpoint("/api/users")];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateEndpoint {
                method: "ANY".into(),
                path: "/api/users".into(),
            }]
        );
    }

    #[test]
    fn test_unsupported_method_and_legacy_capture() {
        let mut config = GatewayConfig::default();
        let mut brew = endpoint("/coffee");
        brew.method = Some("BREW".into());
        config.endpoints = vec![brew, endpoint("/api/users/:id")];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::Method {
                    method: "BREW".into(),
                    path: "/coffee".into(),
                },
                ValidationError::EndpointPath("/api/users/:id".into()),
            ]
        );
    }

    #[test]
    fn test_unroutable_paths() {
        let mut config = GatewayConfig::default();
        config.endpoints = vec![
            endpoint("/files/*rest"),
            endpoint("/users/{id}"),
            endpoint("/users/{name}"),
            endpoint("/broken/{id"),
            endpoint("/files/{*rest}"),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], ValidationError::EndpointPath("/files/*rest".into()));
        assert!(matches!(
            &errors[1],
            ValidationError::RouteConflict { path, .. } if path == "/users/{name}"
        ));
        assert!(matches!(
            &errors[2],
            ValidationError::RouteConflict { path, .. } if path == "/broken/{id"
        ));
    }

    #[test]
    fn test_zero_endpoint_timeout() {
        let mut config = GatewayConfig::default();
        let mut instant = endpoint("/instant");
        instant.timeout = Some("0s".into());
        let mut quick = endpoint("/quick");
        quick.timeout = Some("250ms".into());
        config.endpoints = vec![instant, quick];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::ZeroEndpointTimeout("/instant".into())]);
    }

    #[test]
    fn test_registry_keeps_methods_on_one_path() {
        let mut get = endpoint("/api/users/{id}");
        get.method = Some("GET".into());
        let mut delete = endpoint("/api/users/{id}");
        delete.method = Some("DELETE".into());

        let mut routes = RouteRegistry::new();
        assert!(routes.admit(&get).is_empty());
        assert!(routes.admit(&delete).is_empty());
        assert_eq!(
            routes.admit(&get),
            vec![ValidationError::DuplicateEndpoint {
                method: "GET".into(),
                path: "/api/users/{id}".into(),
            }]
        );
    }
}
