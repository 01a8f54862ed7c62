//! Connection Dispatcher — per-connection state machine:
//! read head → parse → authorize → dispatch to forwarder or tunnel.
//!
//! Grounded on `examples/solidcitizen-multigres/src/connection.rs`'s
//! `handle_connection`/`handshake` phase structure (timeout wraps only the
//! head-read phase, not the data-relay phase; `debug!`/`warn!`/`info!` call
//! discipline; peer-address logging at `debug!`), re-purposed from
//! Postgres StartupMessage parsing to HTTP head parsing.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::auth::{self, Decision};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::ProxyError;
use crate::forwarder;
use crate::metrics::Metrics;
use crate::request::{self, Method};
use crate::tunnel;

const PROXY_AUTH_REQUIRED: &[u8] =
    b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"Proxy\"\r\n\r\n";

/// Handle a single accepted connection end to end. Every code path tears
/// the connection down cleanly; nothing here ever panics on
/// client-controlled input.
pub async fn handle_connection(
    mut client: TcpStream,
    conn_id: u64,
    config: Arc<Config>,
    store: Arc<CredentialStore>,
    metrics: Arc<Metrics>,
) {
    let peer = client
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    debug!(conn_id, peer, "new connection");
    Metrics::inc(&metrics.connections_total);
    Metrics::inc(&metrics.connections_active);

    let head_timeout = Duration::from_secs(config.head_read_timeout_secs);
    let raw_head = match tokio::time::timeout(head_timeout, read_head(&mut client)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            debug!(conn_id, error = %e, "bad request");
            Metrics::inc(&metrics.bad_requests);
            Metrics::dec(&metrics.connections_active);
            return;
        }
        Err(_) => {
            warn!(conn_id, "timed out waiting for a complete request head");
            Metrics::inc(&metrics.bad_requests);
            Metrics::dec(&metrics.connections_active);
            return;
        }
    };

    let parsed = match request::parse(&raw_head) {
        Ok(p) => p,
        Err(e) => {
            debug!(conn_id, error = %e, "bad request");
            Metrics::inc(&metrics.bad_requests);
            Metrics::dec(&metrics.connections_active);
            return;
        }
    };

    match auth::authorize(&parsed.raw_head, config.auth_enabled, &store).await {
        Decision::Allow => Metrics::inc(&metrics.auth_allowed),
        Decision::Deny => {
            Metrics::inc(&metrics.auth_denied);
            if let Err(e) = client.write_all(PROXY_AUTH_REQUIRED).await {
                debug!(conn_id, error = %e, "failed writing 407 challenge");
            }
            Metrics::dec(&metrics.connections_active);
            return;
        }
    };

    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let idle_timeout = (config.idle_tunnel_timeout_secs > 0)
        .then(|| Duration::from_secs(config.idle_tunnel_timeout_secs));
    let result: Result<(), ProxyError> = match parsed.method {
        Method::Connect => {
            Metrics::inc(&metrics.tunnels_total);
            tunnel::tunnel(&mut client, &parsed, connect_timeout, idle_timeout, &metrics).await
        }
        Method::Other => {
            Metrics::inc(&metrics.forwards_total);
            forwarder::forward(&mut client, &parsed, connect_timeout, &metrics).await
        }
    };

    if let Err(e) = result {
        if matches!(e, ProxyError::OriginUnreachable(_)) {
            Metrics::inc(&metrics.origin_unreachable);
        }
        debug!(conn_id, error = %e, "connection ended");
    }

    Metrics::dec(&metrics.connections_active);
}

/// Read bytes until `\r\n\r\n` has been seen, starting with a 1024-byte
/// capacity. Per SPEC_FULL.md §4.4 this is a documented extension of
/// spec.md §9's open question: 1024 bytes is the first read's capacity, not
/// a hard ceiling — the head keeps growing until the terminator is found,
/// bounded only by the caller's `tokio::time::timeout`.
async fn read_head(client: &mut TcpStream) -> Result<Vec<u8>, ProxyError> {
    use tokio::io::AsyncReadExt;

    let mut buf = BytesMut::with_capacity(1024);
    loop {
        let n = client.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(ProxyError::BadRequest("connection closed before a full head arrived".into()));
        }
        if find_crlf_crlf(&buf).is_some() {
            return Ok(buf.to_vec());
        }
    }
}

fn find_crlf_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn client_loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let accept = listener.accept();
        let (test_side, (proxy_side, _)) = tokio::join!(connect, accept);
        (test_side.unwrap(), proxy_side.unwrap())
    }

    async fn store(dir: &tempfile::TempDir) -> Arc<CredentialStore> {
        Arc::new(
            CredentialStore::load(dir.path().join("users.json"))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn auth_disabled_get_is_forwarded() {
        let origin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin_listener.local_addr().unwrap();
        let origin_task = tokio::spawn(async move {
            let (mut sock, _) = origin_listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = sock.read(&mut buf).await.unwrap();
            assert!(n > 0);
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        });

        let (mut test_side, proxy_side) = client_loopback_pair().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.auth_enabled = false;
        let config = Arc::new(config);
        let store = store(&dir).await;
        let metrics = Arc::new(Metrics::new());

        let request = format!("GET http://{}/ HTTP/1.1\r\nHost: x\r\n\r\n", origin_addr);
        test_side.write_all(request.as_bytes()).await.unwrap();

        handle_connection(proxy_side, 1, config, store, metrics.clone()).await;
        origin_task.await.unwrap();

        let mut response = Vec::new();
        test_side.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        assert_eq!(
            metrics.forwards_total.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn auth_enabled_without_credentials_gets_407() {
        let (mut test_side, proxy_side) = client_loopback_pair().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.auth_enabled = true;
        let config = Arc::new(config);
        let store = store(&dir).await;
        let metrics = Arc::new(Metrics::new());

        test_side
            .write_all(b"CONNECT example.test:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        handle_connection(proxy_side, 2, config, store, metrics.clone()).await;

        let mut response = Vec::new();
        test_side.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, PROXY_AUTH_REQUIRED);
        assert_eq!(
            metrics.auth_denied.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn malformed_first_line_closes_silently() {
        let (mut test_side, proxy_side) = client_loopback_pair().await;
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(Config::default());
        let store = store(&dir).await;
        let metrics = Arc::new(Metrics::new());

        test_side.write_all(b"NOT A REQUEST\r\n\r\n").await.unwrap();

        handle_connection(proxy_side, 3, config, store, metrics.clone()).await;

        let mut response = Vec::new();
        test_side.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());
        assert_eq!(
            metrics.bad_requests.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }
}
