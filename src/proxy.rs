//! Server Lifecycle — binds the listener, accepts connections, spawns a
//! per-connection task for each. Grounded verbatim in control flow on
//! `examples/solidcitizen-multigres/src/proxy.rs`'s `run(config)`: bind,
//! log, wrap config in `Arc`, `AtomicU64` connection counter, spawn-per-
//! accept loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::admin;
use crate::config::Config;
use crate::connection;
use crate::credentials::CredentialStore;
use crate::error::ProxyError;
use crate::metrics::Metrics;

static CONN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Start the proxy server. Binds the listen port (and, if configured, the
/// admin port) and runs the accept loop forever. A bind failure is
/// terminal — per SPEC_FULL.md §4.8/§10, this function returns `Err` and
/// the caller (`main`) is responsible for exiting non-zero; there is no
/// retry loop here.
pub async fn run(config: Config) -> Result<(), ProxyError> {
    let addr = format!("{}:{}", config.listen_host, config.listen_port);
    let listener = TcpListener::bind(&addr).await.map_err(ProxyError::BindFailed)?;

    let store = Arc::new(
        CredentialStore::load(&config.db_path)
            .await
            .map_err(|e| ProxyError::Db(e.to_string()))?,
    );
    let metrics = Arc::new(Metrics::new());

    info!(
        addr = %addr,
        auth_enabled = config.auth_enabled,
        db_path = %config.db_path,
        users = store.len().await,
        "authproxy listening"
    );

    let config = Arc::new(config);

    if let Some(admin_port) = config.admin_port {
        let admin_state = admin::AdminState {
            metrics: Arc::clone(&metrics),
            store: Arc::clone(&store),
        };
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_state, admin_port).await {
                tracing::warn!(error = %e, "admin surface exited");
            }
        });
    }

    loop {
        let (socket, _) = listener.accept().await?;
        let config = Arc::clone(&config);
        let store = Arc::clone(&store);
        let metrics = Arc::clone(&metrics);
        let conn_id = CONN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;

        tokio::spawn(async move {
            connection::handle_connection(socket, conn_id, config, store, metrics).await;
        });
    }
}
