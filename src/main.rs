use clap::Parser;
use tracing_subscriber::EnvFilter;

use authproxy::config::{Cli, Command, Config};
use authproxy::credentials::{CredentialStore, InsertOutcome};
use authproxy::{password, proxy};

const BANNER: &str = r#"
  ╔══════════════════════════════════════════════════╗
  ║                 A U T H P R O X Y                ║
  ║   Forwarding HTTP/HTTPS proxy with Basic auth    ║
  ║                    [ Rust ]                      ║
  ╚══════════════════════════════════════════════════╝
"#;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load(&cli);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    if let Err(e) = config.validate() {
        eprintln!("fatal: invalid configuration: {e}");
        std::process::exit(1);
    }

    match cli.command {
        None | Some(Command::Serve) => {
            eprintln!("{BANNER}");
            if let Err(e) = proxy::run(config).await {
                eprintln!("fatal: {e}");
                std::process::exit(1);
            }
        }
        Some(Command::AddUser { username, password }) => {
            if let Err(e) = add_user(&config.db_path, &username, &password).await {
                eprintln!("fatal: {e}");
                std::process::exit(1);
            }
        }
    }
}

/// Hash `password`, insert `username` into the credential store at
/// `db_path`, and report the outcome. Grounded on
/// `examples/original_source/delpha_proxy/server.py`'s `add_user`, which
/// catches a duplicate-username error distinctly from other storage errors
/// and prints a dedicated warning rather than a generic failure.
async fn add_user(db_path: &str, username: &str, password: &str) -> Result<(), String> {
    let store = CredentialStore::load(db_path)
        .await
        .map_err(|e| format!("failed to open credential store: {e}"))?;
    let stored_credential = password::stored_credential(password, None);

    match store
        .insert(username, stored_credential)
        .await
        .map_err(|e| format!("failed to write credential store: {e}"))?
    {
        InsertOutcome::Ok => {
            println!("added user '{username}'");
            Ok(())
        }
        InsertOutcome::Duplicate => {
            eprintln!("warning: user '{username}' already exists — not modified");
            Ok(())
        }
    }
}
