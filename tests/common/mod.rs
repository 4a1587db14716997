//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::Request, http::StatusCode, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use dispatch_gateway::{GatewayConfig, HttpServer, Shutdown, Stage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Requests seen by a mock backend, as raw text (head + body).
pub type Seen = Arc<Mutex<Vec<String>>>;

/// Read one HTTP/1.1 request: the head plus a `Content-Length` body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + body_len {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn status_line(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("HTTP/1.1 {} {}", status, reason)
}

/// Start a programmable mock backend. `f` receives the raw request and
/// returns `(status, body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        let (status, body) = f(request).await;
                        let response = format!(
                            "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Backend that answers every request with the same status and body.
pub async fn start_mock_backend(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (status, body.to_string()) }).await
}

/// Backend that answers with the raw request it received, wrapped in JSON.
pub async fn start_echo_backend() -> SocketAddr {
    start_programmable_backend(|request| async move {
        (200, serde_json::json!({ "request": request }).to_string())
    })
    .await
}

/// Backend streaming `chunks` (after their delays) as an event stream, then closing.
pub async fn start_sse_backend(status: u16, chunks: Vec<(Duration, &'static str)>) -> (SocketAddr, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let chunks = chunks.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        recorded.lock().unwrap().push(request);

                        let head = format!(
                            "{}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
                            status_line(status)
                        );
                        if socket.write_all(head.as_bytes()).await.is_err() {
                            return;
                        }
                        for (delay, chunk) in chunks {
                            tokio::time::sleep(delay).await;
                            if socket.write_all(chunk.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, seen)
}

/// HTTPS origin with a fresh self-signed certificate for 127.0.0.1.
///
/// Answers every request with the path, `Host` and `X-Forwarded-Proto` it saw.
/// Returns the origin address and a PEM file holding its certificate.
pub async fn start_tls_origin() -> (SocketAddr, String) {
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["127.0.0.1".to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap();
    let tls = RustlsConfig::from_pem(cert.pem().into_bytes(), key.serialize_pem().into_bytes())
        .await
        .unwrap();

    let app = Router::new().fallback(|req: Request| async move {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Json(serde_json::json!({
            "path": req.uri().to_string(),
            "host": header("host"),
            "proto": header("x-forwarded-proto"),
        }))
    });

    let handle = axum_server::Handle::new();
    let serving = handle.clone();
    tokio::spawn(async move {
        let _ = axum_server::bind_rustls(SocketAddr::from(([127, 0, 0, 1], 0)), tls)
            .handle(serving)
            .serve(app.into_make_service())
            .await;
    });
    let addr = handle.listening().await.unwrap();

    let ca_path = std::env::temp_dir().join(format!("dispatch-gateway-origin-{}.pem", addr.port()));
    std::fs::write(&ca_path, cert.pem()).unwrap();
    (addr, ca_path.to_string_lossy().into_owned())
}

/// An address nothing listens on.
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Start the gateway on an ephemeral port.
pub async fn spawn_gateway(config: GatewayConfig, stages: Vec<Arc<dyn Stage>>) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::with_stages(config, stages).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
