//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Copy inbound headers onto the outgoing request
//! - Add X-Forwarded-For, X-Real-IP, X-Forwarded-Host, X-Forwarded-Proto
//! - Strip hop-by-hop headers
//!
//! # Design Decisions
//! - Preserve the inbound X-Forwarded-For chain and append the direct peer as newest hop
//! - Values already set by an earlier stage win over derived ones
//! - Never fails: malformed input skips the affected header

use axum::http::{
    header::{self, HeaderName},
    request::Parts,
    HeaderMap, HeaderValue,
};
use axum::extract::ConnectInfo;
use std::net::SocketAddr;

use crate::http::request::ClientConn;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Copy every inbound header onto `outgoing` and overlay the forwarding headers.
pub fn propagate(outgoing: &mut HeaderMap, incoming: &Parts) {
    copy_all(outgoing, &incoming.headers);

    let client_ip = peer_addr(incoming).map(|addr| client_ip(&addr).to_string());
    let incoming_xff = header_str(&incoming.headers, &X_FORWARDED_FOR);

    // Forwarding chain: inbound chain first, direct peer appended as newest hop.
    if let Some(xff) = incoming_xff {
        set(outgoing, X_FORWARDED_FOR, xff);
    }
    if let Some(ip) = client_ip.as_deref().filter(|ip| !ip.is_empty()) {
        let chain = match header_str(outgoing, &X_FORWARDED_FOR) {
            Some(prior) => format!("{}, {}", prior, ip),
            None => ip.to_string(),
        };
        set(outgoing, X_FORWARDED_FOR, &chain);
    }

    if is_unset(outgoing, &X_FORWARDED_HOST) {
        if let Some(host) = incoming_host(incoming) {
            set(outgoing, X_FORWARDED_HOST, host);
        }
    }

    if is_unset(outgoing, &X_FORWARDED_PROTO) {
        let scheme = header_str(&incoming.headers, &X_FORWARDED_PROTO)
            .unwrap_or_else(|| if is_tls(incoming) { "https" } else { "http" });
        set(outgoing, X_FORWARDED_PROTO, scheme);
    }

    if is_unset(outgoing, &X_REAL_IP) {
        let real_ip = incoming_xff
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or(client_ip.as_deref().filter(|ip| !ip.is_empty()));
        if let Some(ip) = real_ip {
            set(outgoing, X_REAL_IP, ip);
        }
    }
}

/// Copy all values of every header in `from`, replacing same-named headers in `to`.
pub fn copy_all(to: &mut HeaderMap, from: &HeaderMap) {
    for name in from.keys() {
        to.remove(name);
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Host portion of a peer address.
///
/// `ip:port` and `[v6]:port` lose their port (and brackets); anything else,
/// such as a bare IPv6 address or a socket path, is returned verbatim.
pub fn client_ip(remote_addr: &str) -> &str {
    if let Some(rest) = remote_addr.strip_prefix('[') {
        return match rest.split_once("]:") {
            Some((host, port)) if !port.contains(':') => host,
            _ => remote_addr,
        };
    }

    match remote_addr.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => remote_addr,
    }
}

fn peer_addr(incoming: &Parts) -> Option<String> {
    if let Some(conn) = incoming.extensions.get::<ClientConn>() {
        return Some(conn.remote_addr.clone());
    }
    incoming
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
}

fn is_tls(incoming: &Parts) -> bool {
    incoming
        .extensions
        .get::<ClientConn>()
        .map(|c| c.tls)
        .unwrap_or(false)
}

fn incoming_host(incoming: &Parts) -> Option<&str> {
    header_str(&incoming.headers, &header::HOST)
        .or_else(|| incoming.uri.authority().map(|a| a.as_str()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn is_unset(headers: &HeaderMap, name: &HeaderName) -> bool {
    headers.get(name).map_or(true, |v| v.is_empty())
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => {
            tracing::debug!(header = %name, "Skipping forwarding header with invalid value");
        }
    }
}
