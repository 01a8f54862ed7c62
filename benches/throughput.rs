//! Throughput benchmark: measure authproxy's forwarding overhead vs a
//! direct connection to the origin.
//!
//! Requires a plain HTTP origin on localhost:8000 (or AUTHPROXY_BENCH_ORIGIN_PORT)
//! and a running authproxy on localhost:8080 (or AUTHPROXY_BENCH_PROXY_PORT),
//! with auth disabled.
//!
//! Usage:
//!   # Terminal 1: any HTTP server, e.g. `python3 -m http.server 8000`
//!   # Terminal 2: ./target/release/authproxy --port 8080
//!   # Terminal 3: cargo bench --bench throughput
//!
//! The benchmark measures round-trip latency of a `GET /` request through
//! both a direct connection to the origin and through authproxy, reporting
//! the overhead. Grounded on
//! `examples/solidcitizen-multigres/benches/throughput.rs` (manual
//! `std::time::Instant` timing loop, `harness = false`, no `criterion`),
//! adapted from Postgres `SELECT 1` round-trips to HTTP GETs.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Send `GET / HTTP/1.1` and read until the response headers are complete,
/// draining whatever body follows on this read. Good enough for timing a
/// small response; not a general HTTP client.
fn request_once(stream: &mut TcpStream, request: &[u8]) -> std::io::Result<()> {
    stream.write_all(request)?;
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before response headers arrived",
            ));
        }
        if buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(());
        }
    }
}

fn bench_requests(addr: &str, request: &[u8], iterations: u32) -> Option<Duration> {
    let mut total = Duration::ZERO;
    for _ in 0..iterations {
        let mut stream = TcpStream::connect(addr).ok()?;
        stream.set_read_timeout(Some(Duration::from_secs(5))).ok()?;
        let start = Instant::now();
        request_once(&mut stream, request).ok()?;
        total += start.elapsed();
    }
    Some(total / iterations)
}

fn main() {
    let origin_port =
        std::env::var("AUTHPROXY_BENCH_ORIGIN_PORT").unwrap_or_else(|_| "8000".into());
    let proxy_port =
        std::env::var("AUTHPROXY_BENCH_PROXY_PORT").unwrap_or_else(|_| "8080".into());
    let iterations: u32 = std::env::var("AUTHPROXY_BENCH_ITERATIONS")
        .unwrap_or_else(|_| "500".into())
        .parse()
        .unwrap_or(500);
    let warmup = 50;

    println!("authproxy throughput benchmark");
    println!("──────────────────────────────");
    println!("iterations: {iterations}");
    println!("direct:     localhost:{origin_port}");
    println!("proxy:      localhost:{proxy_port}");
    println!();

    let direct_addr = format!("localhost:{origin_port}");
    let direct_request = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
    if bench_requests(&direct_addr, direct_request, warmup).is_none() {
        eprintln!("could not connect directly to origin at {direct_addr}");
        eprintln!("start an HTTP server there and try again, or set AUTHPROXY_BENCH_ORIGIN_PORT");
        std::process::exit(1);
    }
    let direct_avg = bench_requests(&direct_addr, direct_request, iterations).unwrap();

    let proxy_addr = format!("localhost:{proxy_port}");
    let proxy_request = format!(
        "GET http://localhost:{origin_port}/ HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    );
    let proxy_request = proxy_request.as_bytes();
    if bench_requests(&proxy_addr, proxy_request, warmup).is_none() {
        eprintln!("could not connect through authproxy at {proxy_addr}");
        eprintln!("start authproxy with auth disabled and try again, or set AUTHPROXY_BENCH_PROXY_PORT");
        std::process::exit(1);
    }
    let proxy_avg = bench_requests(&proxy_addr, proxy_request, iterations).unwrap();

    let overhead = proxy_avg.saturating_sub(direct_avg);
    let overhead_pct = if direct_avg.as_nanos() > 0 {
        (overhead.as_nanos() as f64 / direct_avg.as_nanos() as f64) * 100.0
    } else {
        0.0
    };

    println!("Results (average per GET /):");
    println!("  direct:    {:>8.1}us", direct_avg.as_nanos() as f64 / 1000.0);
    println!("  proxy:     {:>8.1}us", proxy_avg.as_nanos() as f64 / 1000.0);
    println!(
        "  overhead:  {:>8.1}us ({:.1}%)",
        overhead.as_nanos() as f64 / 1000.0,
        overhead_pct
    );
}
