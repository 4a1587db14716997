//! Outbound HTTP plumbing shared by every forwarding path.
//!
//! # Responsibilities
//! - Build the shared hyper client (`http` and `https` targets)
//! - Resolve backend URLs from host + pattern + inbound query
//! - Prepare forwarded header sets

use std::io;

use axum::{
    body::Body,
    http::{header, HeaderMap, Uri},
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::{BackendConfig, UpstreamConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::net::load_client_tls;
use crate::security::strip_hop_by_hop;

/// Client used for static origins, SSE backends and aggregate backends.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the shared client. Fails only when the configured CA bundle cannot be loaded.
pub fn build_client(upstream: &UpstreamConfig) -> io::Result<HttpClient> {
    let tls = load_client_tls(upstream)?;

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Parse an origin/backend host. It must be absolute and carry a host.
pub fn parse_origin(origin: &str) -> GatewayResult<Url> {
    let url = Url::parse(origin).map_err(|e| GatewayError::InvalidOrigin {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    if url.host_str().is_none() {
        return Err(GatewayError::InvalidOrigin {
            origin: origin.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

/// `scheme://authority` of `origin` followed by `path_and_query`.
pub fn origin_uri(origin: &Url, path_and_query: &str) -> GatewayResult<Uri> {
    let mut target = format!("{}://{}", origin.scheme(), origin.host_str().unwrap_or_default());
    if let Some(port) = origin.port() {
        target.push_str(&format!(":{}", port));
    }
    target.push_str(path_and_query);
    target.parse::<Uri>().map_err(|e| GatewayError::InvalidOrigin {
        origin: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Backend URL: host, then `url_pattern` (or the inbound path), then the inbound query.
pub fn backend_uri(backend: &BackendConfig, inbound: &Uri) -> GatewayResult<Uri> {
    let host = parse_origin(&backend.host)?;
    let base = host.as_str().trim_end_matches('/');
    let path = backend.url_pattern.as_deref().unwrap_or_else(|| inbound.path());

    let mut target = String::with_capacity(base.len() + path.len());
    target.push_str(base);
    if !path.starts_with('/') {
        target.push('/');
    }
    target.push_str(path);
    if let Some(query) = inbound.query() {
        target.push('?');
        target.push_str(query);
    }

    target.parse::<Uri>().map_err(|e| GatewayError::InvalidOrigin {
        origin: backend.host.clone(),
        reason: e.to_string(),
    })
}

/// Inbound headers minus `Host`, `Content-Length` and hop-by-hop headers.
///
/// The client recomputes `Host` from the target URI and the length from the body.
pub fn forward_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = incoming.clone();
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    strip_hop_by_hop(&mut headers);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_origin() {
        assert!(parse_origin("http://web:8080").is_ok());
        assert!(parse_origin("not a url").is_err());
        assert!(matches!(
            parse_origin("unix:/var/run/web.sock"),
            Err(GatewayError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn test_origin_uri_keeps_path_and_query() {
        let origin = parse_origin("https://cdn.example.com:8443/ignored").unwrap();
        let uri = origin_uri(&origin, "/static/app.js?v=2").unwrap();
        assert_eq!(uri.to_string(), "https://cdn.example.com:8443/static/app.js?v=2");

        let origin = parse_origin("http://web").unwrap();
        assert_eq!(origin_uri(&origin, "/").unwrap().to_string(), "http://web/");
    }

    #[test]
    fn test_backend_uri() {
        let inbound: Uri = "/api/users?page=2".parse().unwrap();

        let backend = BackendConfig::new("http://users:8000");
        assert_eq!(
            backend_uri(&backend, &inbound).unwrap().to_string(),
            "http://users:8000/api/users?page=2"
        );

        let mut backend = BackendConfig::new("http://users:8000/");
        backend.url_pattern = Some("/v1/users".into());
        assert_eq!(
            backend_uri(&backend, &inbound).unwrap().to_string(),
            "http://users:8000/v1/users?page=2"
        );

        assert!(backend_uri(&BackendConfig::new(""), &inbound).is_err());
    }

    #[test]
    fn test_forward_headers() {
        let mut incoming = HeaderMap::new();
        incoming.insert(header::HOST, HeaderValue::from_static("gateway"));
        incoming.insert(header::CONTENT_LENGTH, HeaderValue::from_static("4"));
        incoming.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        incoming.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));

        let headers = forward_headers(&incoming);
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert_eq!(headers[header::AUTHORIZATION], "Bearer t");
    }
}
