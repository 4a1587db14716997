//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Listener certificate and key for the optional TLS listener
//! - Trust roots for `https` origins and backends

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::{crypto::aws_lc_rs, ClientConfig, RootCertStore};

use crate::config::schema::{TlsConfig, UpstreamConfig};

/// Load the listener certificate and key named in the configuration.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, io::Error> {
    let cert_path = Path::new(&tls.cert_path);
    let key_path = Path::new(&tls.key_path);

    for (kind, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} file not found: {:?}", kind, path),
            ));
        }
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Client TLS settings for outbound connections: the system roots plus the
/// optional `upstream.ca_cert_path` bundle.
///
/// A missing or empty bundle is an error; unreadable system certificates are
/// only logged.
pub fn load_client_tls(upstream: &UpstreamConfig) -> Result<ClientConfig, io::Error> {
    let mut roots = RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        tracing::warn!(error = %e, "Failed to load system certificate");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(added, ignored, "Loaded system root certificates");

    if let Some(path) = &upstream.ca_cert_path {
        let file = File::open(path).map_err(|e| {
            io::Error::new(e.kind(), format!("CA bundle {:?}: {}", path, e))
        })?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("No certificates found in CA bundle {:?}", path),
            ));
        }
        for cert in certs {
            roots
                .add(cert)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
        tracing::info!(ca_cert_path = %path, "Trusting extra CA bundle for upstreams");
    }

    Ok(
        ClientConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}
