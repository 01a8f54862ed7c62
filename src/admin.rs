//! Admin HTTP surface — health checks, Prometheus metrics, JSON status.
//!
//! Grounded on `examples/solidcitizen-multigres/src/admin.rs`: same
//! `AdminState`/`serve`/`push_metric` shape, with the pool/resolver
//! sections replaced by this proxy's own connection/auth/tunnel/forward
//! counters and credential-store user count. Spawned as a background task
//! when `admin_port` is configured; never touches the proxy data path.
//!
//!   GET /health  — 200 OK, for load balancer health checks
//!   GET /metrics — Prometheus exposition format
//!   GET /status  — JSON snapshot of connection/auth/routing counters

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::credentials::CredentialStore;
use crate::metrics::Metrics;

/// Shared state for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub metrics: Arc<Metrics>,
    pub store: Arc<CredentialStore>,
}

/// Start the admin HTTP server on the given port. Returns once the
/// listener stops serving (bind failure or `axum::serve` error).
pub async fn serve(state: AdminState, port: u16) -> std::io::Result<()> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "admin surface listening");
    axum::serve(listener, app).await
}

// ─── GET /health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/json")], r#"{"status":"ok"}"#)
}

// ─── GET /metrics ─────────────────────────────────────────────────────────

async fn metrics(State(state): State<AdminState>) -> Response {
    let text = render_metrics(&state.metrics, state.store.len().await as u64);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        text,
    )
        .into_response()
}

/// Build the Prometheus exposition text for one snapshot of counters.
/// Split out from the `metrics` handler so tests can exercise the exact
/// text-building logic without going through an axum `Response` body.
fn render_metrics(m: &Metrics, user_count: u64) -> String {
    let mut out = String::with_capacity(1024);

    out.push_str("# HELP authproxy_connections_total Total connections accepted.\n");
    out.push_str("# TYPE authproxy_connections_total counter\n");
    push_metric(&mut out, "authproxy_connections_total", m.connections_total.load(Ordering::Relaxed));
    out.push_str("# HELP authproxy_connections_active Currently active connections.\n");
    out.push_str("# TYPE authproxy_connections_active gauge\n");
    push_metric(&mut out, "authproxy_connections_active", m.connections_active.load(Ordering::Relaxed));

    out.push_str("# HELP authproxy_auth_allowed_total Requests that passed authorization.\n");
    out.push_str("# TYPE authproxy_auth_allowed_total counter\n");
    push_metric(&mut out, "authproxy_auth_allowed_total", m.auth_allowed.load(Ordering::Relaxed));
    out.push_str("# HELP authproxy_auth_denied_total Requests rejected with 407.\n");
    out.push_str("# TYPE authproxy_auth_denied_total counter\n");
    push_metric(&mut out, "authproxy_auth_denied_total", m.auth_denied.load(Ordering::Relaxed));

    out.push_str("# HELP authproxy_bad_requests_total Malformed or unparseable request heads.\n");
    out.push_str("# TYPE authproxy_bad_requests_total counter\n");
    push_metric(&mut out, "authproxy_bad_requests_total", m.bad_requests.load(Ordering::Relaxed));

    out.push_str("# HELP authproxy_forwards_total Plaintext HTTP requests forwarded.\n");
    out.push_str("# TYPE authproxy_forwards_total counter\n");
    push_metric(&mut out, "authproxy_forwards_total", m.forwards_total.load(Ordering::Relaxed));
    out.push_str("# HELP authproxy_tunnels_total CONNECT tunnels opened.\n");
    out.push_str("# TYPE authproxy_tunnels_total counter\n");
    push_metric(&mut out, "authproxy_tunnels_total", m.tunnels_total.load(Ordering::Relaxed));
    out.push_str("# HELP authproxy_origin_unreachable_total Origin connect failures.\n");
    out.push_str("# TYPE authproxy_origin_unreachable_total counter\n");
    push_metric(&mut out, "authproxy_origin_unreachable_total", m.origin_unreachable.load(Ordering::Relaxed));

    out.push_str("# HELP authproxy_bytes_client_to_origin_total Bytes relayed from clients to origins.\n");
    out.push_str("# TYPE authproxy_bytes_client_to_origin_total counter\n");
    push_metric(&mut out, "authproxy_bytes_client_to_origin_total", m.bytes_client_to_origin.load(Ordering::Relaxed));
    out.push_str("# HELP authproxy_bytes_origin_to_client_total Bytes relayed from origins to clients.\n");
    out.push_str("# TYPE authproxy_bytes_origin_to_client_total counter\n");
    push_metric(&mut out, "authproxy_bytes_origin_to_client_total", m.bytes_origin_to_client.load(Ordering::Relaxed));

    out.push_str("# HELP authproxy_credential_store_users Users currently in the credential store.\n");
    out.push_str("# TYPE authproxy_credential_store_users gauge\n");
    push_metric(&mut out, "authproxy_credential_store_users", user_count);

    out
}

fn push_metric(out: &mut String, name: &str, value: u64) {
    out.push_str(&format!("{name} {value}\n"));
}

// ─── GET /status ──────────────────────────────────────────────────────────

async fn status(State(state): State<AdminState>) -> Response {
    let m = &state.metrics;

    let json = format!(
        "{{\n  \"connections_total\": {},\n  \"connections_active\": {},\n  \"auth_allowed\": {},\n  \"auth_denied\": {},\n  \"bad_requests\": {},\n  \"forwards_total\": {},\n  \"tunnels_total\": {},\n  \"origin_unreachable\": {},\n  \"bytes_client_to_origin\": {},\n  \"bytes_origin_to_client\": {},\n  \"credential_store_users\": {}\n}}\n",
        m.connections_total.load(Ordering::Relaxed),
        m.connections_active.load(Ordering::Relaxed),
        m.auth_allowed.load(Ordering::Relaxed),
        m.auth_denied.load(Ordering::Relaxed),
        m.bad_requests.load(Ordering::Relaxed),
        m.forwards_total.load(Ordering::Relaxed),
        m.tunnels_total.load(Ordering::Relaxed),
        m.origin_unreachable.load(Ordering::Relaxed),
        m.bytes_client_to_origin.load(Ordering::Relaxed),
        m.bytes_origin_to_client.load(Ordering::Relaxed),
        state.store.len().await,
    );

    (StatusCode::OK, [("content-type", "application/json")], json).into_response()
}
