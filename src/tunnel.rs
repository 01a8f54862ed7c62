//! CONNECT Tunnel — opaque bidirectional TCP relay established after a
//! successful HTTP CONNECT handshake.
//!
//! Grounded on `examples/solidcitizen-multigres/src/connection.rs`'s
//! terminal relay phase for Postgres connections (copy both directions
//! concurrently, let each proceed independently until its own EOF so one
//! side closing doesn't deadlock the other), reimplemented as a manual pump
//! instead of `tokio::io::copy_bidirectional` so each read can be wrapped in
//! an idle timeout per SPEC_FULL.md's idle-tunnel-detection requirement —
//! `copy_bidirectional` gives no hook to reset a timer on a byte actually
//! moving.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::ProxyError;
use crate::metrics::Metrics;
use crate::request::ParsedRequest;

const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
const RELAY_CHUNK_SIZE: usize = 8192;

/// Open a TCP connection to `(parsed.target_host, parsed.target_port)`,
/// reply with `200 Connection Established`, then relay bytes bidirectionally
/// until either side closes or errors. On connect failure, nothing is sent
/// to the client beyond the eventual connection close.
///
/// `idle_timeout` of `None` (configured via `idle_tunnel_timeout_secs == 0`)
/// disables idle detection; otherwise each direction's read is bounded by
/// `idle_timeout` and any read that sits that long with no bytes closes the
/// whole tunnel.
pub async fn tunnel(
    client: &mut TcpStream,
    parsed: &ParsedRequest,
    connect_timeout: Duration,
    idle_timeout: Option<Duration>,
    metrics: &Arc<Metrics>,
) -> Result<(), ProxyError> {
    let addr = (parsed.target_host.as_str(), parsed.target_port);
    let mut origin = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::OriginUnreachable(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(ProxyError::OriginUnreachable)?;

    client.write_all(CONNECTION_ESTABLISHED).await?;

    let (client_read, client_write) = tokio::io::split(client);
    let (origin_read, origin_write) = tokio::io::split(&mut origin);

    let client_to_origin = pump(
        client_read,
        origin_write,
        idle_timeout,
        &metrics.bytes_client_to_origin,
    );
    let origin_to_client = pump(
        origin_read,
        client_write,
        idle_timeout,
        &metrics.bytes_origin_to_client,
    );

    let (from_client, from_origin) = tokio::try_join!(client_to_origin, origin_to_client)?;

    debug!(
        host = %parsed.target_host,
        port = parsed.target_port,
        from_client,
        from_origin,
        "tunnel closed"
    );
    Ok(())
}

/// Copy from `reader` to `writer` until EOF, counting bytes into `counter`.
/// Each individual read is bounded by `idle_timeout` when set — traffic
/// resets the deadline implicitly, since a fresh timeout starts on every
/// call, so only genuine inactivity trips it.
async fn pump(
    mut reader: impl AsyncRead + Unpin,
    mut writer: impl AsyncWrite + Unpin,
    idle_timeout: Option<Duration>,
    counter: &AtomicU64,
) -> Result<u64, ProxyError> {
    let mut buf = [0u8; RELAY_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match idle_timeout {
            Some(d) => tokio::time::timeout(d, reader.read(&mut buf))
                .await
                .map_err(|_| {
                    ProxyError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "idle tunnel timeout",
                    ))
                })??,
            None => reader.read(&mut buf).await?,
        };
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        Metrics::add(counter, n as u64);
        total += n as u64;
    }
    let _ = writer.shutdown().await;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
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

    #[tokio::test]
    async fn sends_200_then_relays_both_directions() {
        let origin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin_listener.local_addr().unwrap();

        let origin_task = tokio::spawn(async move {
            let (mut sock, _) = origin_listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            sock.write_all(b"world").await.unwrap();
            // Closing drops the origin side, ending the relay.
        });

        let (mut test_side, mut proxy_side) = client_loopback_pair().await;
        let parsed = ParsedRequest {
            method: Method::Connect,
            target_host: origin_addr.ip().to_string(),
            target_port: origin_addr.port(),
            raw_head: b"CONNECT t.test:443 HTTP/1.1\r\n\r\n".to_vec(),
        };

        let metrics = Arc::new(Metrics::new());
        let tunnel_task = tokio::spawn(async move {
            tunnel(&mut proxy_side, &parsed, Duration::from_secs(5), None, &metrics)
                .await
                .unwrap();
            metrics
        });

        let mut established = [0u8; CONNECTION_ESTABLISHED.len()];
        test_side.read_exact(&mut established).await.unwrap();
        assert_eq!(&established, CONNECTION_ESTABLISHED);

        test_side.write_all(b"hello").await.unwrap();
        let mut response = [0u8; 5];
        test_side.read_exact(&mut response).await.unwrap();
        assert_eq!(&response, b"world");

        drop(test_side);
        origin_task.await.unwrap();
        let metrics = tunnel_task.await.unwrap();
        assert_eq!(
            metrics.bytes_client_to_origin.load(std::sync::atomic::Ordering::Relaxed),
            5
        );
        assert_eq!(
            metrics.bytes_origin_to_client.load(std::sync::atomic::Ordering::Relaxed),
            5
        );
    }

    #[tokio::test]
    async fn unreachable_origin_never_sends_connection_established() {
        let (mut test_side, mut proxy_side) = client_loopback_pair().await;
        let parsed = ParsedRequest {
            method: Method::Connect,
            target_host: "127.0.0.1".to_string(),
            target_port: 1,
            raw_head: b"CONNECT x:1 HTTP/1.1\r\n\r\n".to_vec(),
        };
        let metrics = Arc::new(Metrics::new());
        let result = tunnel(&mut proxy_side, &parsed, Duration::from_millis(200), None, &metrics).await;
        assert!(result.is_err());

        drop(proxy_side);
        let mut buf = Vec::new();
        test_side.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn idle_timeout_closes_a_silent_tunnel() {
        let origin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin_listener.local_addr().unwrap();
        let origin_task = tokio::spawn(async move {
            let (sock, _) = origin_listener.accept().await.unwrap();
            // Neither side sends anything; just hold the connection open
            // long enough for the idle timeout to trip.
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(sock);
        });

        let (test_side, mut proxy_side) = client_loopback_pair().await;
        let parsed = ParsedRequest {
            method: Method::Connect,
            target_host: origin_addr.ip().to_string(),
            target_port: origin_addr.port(),
            raw_head: b"CONNECT t.test:443 HTTP/1.1\r\n\r\n".to_vec(),
        };

        let metrics = Arc::new(Metrics::new());
        let result = tunnel(
            &mut proxy_side,
            &parsed,
            Duration::from_secs(5),
            Some(Duration::from_millis(50)),
            &metrics,
        )
        .await;
        assert!(result.is_err());

        drop(test_side);
        origin_task.await.unwrap();
    }
}
