//! HTTP Forwarder — one-shot plaintext request/response passthrough for
//! absolute-URI requests.
//!
//! Grounded on `examples/original_source/delpha_proxy/server.py`'s
//! `_forward_request` (same no-Content-Length/chunked-framing contract,
//! relies on origin EOF) restructured as real async I/O the way
//! `examples/solidcitizen-multigres/src/connection.rs::connect_upstream`
//! opens origin sockets.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::ProxyError;
use crate::metrics::Metrics;
use crate::request::ParsedRequest;

const CHUNK_SIZE: usize = 4096;

/// Forward `parsed.raw_head` to `(parsed.target_host, parsed.target_port)`
/// and relay the origin's response back to `client` until the origin
/// closes the connection. No further bytes are read from the client — this
/// is a one-shot request/response passthrough, not a persistent connection.
pub async fn forward(
    client: &mut TcpStream,
    parsed: &ParsedRequest,
    connect_timeout: Duration,
    metrics: &Arc<Metrics>,
) -> Result<(), ProxyError> {
    let addr = (parsed.target_host.as_str(), parsed.target_port);
    let mut origin = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::OriginUnreachable(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(ProxyError::OriginUnreachable)?;

    origin.write_all(&parsed.raw_head).await?;
    Metrics::add(&metrics.bytes_client_to_origin, parsed.raw_head.len() as u64);

    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = origin.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        client.write_all(&buf[..n]).await?;
        Metrics::add(&metrics.bytes_origin_to_client, n as u64);
    }

    debug!(host = %parsed.target_host, port = parsed.target_port, "forward complete");
    Ok(())
}
