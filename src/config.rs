//! Configuration — CLI flags, environment variables, config file.
//!
//! Grounded on `examples/solidcitizen-multigres/src/config.rs`: same
//! defaults → config file → env vars → CLI flags layering, same
//! `key = value` file format (`#` comments, quote stripping, unknown keys
//! ignored), same env var naming convention (just `AUTHPROXY_` instead of
//! `PGVPD_`). The `Cli` additionally carries a subcommand (`serve` /
//! `add-user`) per SPEC_FULL.md §6/§9, replacing the original's interactive
//! shell.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;

/// authproxy — forwarding HTTP/HTTPS proxy with optional Basic auth
#[derive(Parser, Debug)]
#[command(name = "authproxy", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(long, default_value = "authproxy.conf")]
    pub config: String,

    /// Listen port
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    pub listen_host: Option<String>,

    /// Require Proxy-Authorization: Basic for every request
    #[arg(long)]
    pub auth_enabled: Option<bool>,

    /// Path to the credential store JSON file
    #[arg(long)]
    pub db_path: Option<String>,

    /// Log level
    #[arg(long)]
    pub log_level: Option<String>,

    /// Seconds to wait for a complete request head
    #[arg(long)]
    pub head_read_timeout: Option<u64>,

    /// Seconds to wait for the origin TCP connect to complete
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Seconds an idle CONNECT tunnel may sit with no traffic before it is
    /// closed (0 disables idle detection)
    #[arg(long)]
    pub idle_tunnel_timeout: Option<u64>,

    /// HTTP port for the admin surface (health, metrics, status)
    #[arg(long)]
    pub admin_port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the proxy server (default if no subcommand is given)
    Serve,
    /// Add a user to the credential store and exit
    AddUser { username: String, password: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub listen_host: String,
    pub auth_enabled: bool,
    pub db_path: String,
    pub log_level: String,
    pub head_read_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub idle_tunnel_timeout_secs: u64,
    pub admin_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            listen_host: "0.0.0.0".into(),
            auth_enabled: false,
            db_path: "users.json".into(),
            log_level: "info".into(),
            head_read_timeout_secs: 30,
            connect_timeout_secs: 10,
            idle_tunnel_timeout_secs: 300,
            admin_port: None,
        }
    }
}

impl Config {
    /// Load configuration: defaults → config file → env vars → CLI flags.
    pub fn load(cli: &Cli) -> Self {
        let mut config = Config::default();

        // 1. Config file
        let config_path = Path::new(&cli.config);
        if config_path.exists()
            && let Ok(content) = fs::read_to_string(config_path)
        {
            apply_config_file(&mut config, &content);
        }

        // 2. Environment variables
        apply_env(&mut config);

        // 3. CLI flags (highest priority)
        if let Some(v) = cli.port {
            config.listen_port = v;
        }
        if let Some(v) = &cli.listen_host {
            config.listen_host = v.clone();
        }
        if let Some(v) = cli.auth_enabled {
            config.auth_enabled = v;
        }
        if let Some(v) = &cli.db_path {
            config.db_path = v.clone();
        }
        if let Some(v) = &cli.log_level {
            config.log_level = v.clone();
        }
        if let Some(v) = cli.head_read_timeout {
            config.head_read_timeout_secs = v;
        }
        if let Some(v) = cli.connect_timeout {
            config.connect_timeout_secs = v;
        }
        if let Some(v) = cli.idle_tunnel_timeout {
            config.idle_tunnel_timeout_secs = v;
        }
        if let Some(v) = cli.admin_port {
            config.admin_port = Some(v);
        }

        config
    }

    /// Validate configuration. Returns an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("listen_port must be in [1, 65535]".into());
        }
        if self.head_read_timeout_secs == 0 {
            return Err("head_read_timeout must be > 0".into());
        }
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout must be > 0".into());
        }
        if self.admin_port == Some(self.listen_port) {
            return Err("admin_port must differ from listen_port".into());
        }
        Ok(())
    }
}

fn apply_config_file(config: &mut Config, content: &str) {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some(eq_pos) = trimmed.find('=') else {
            continue;
        };

        let key = trimmed[..eq_pos].trim();
        let mut value = trimmed[eq_pos + 1..].trim().to_string();

        // Strip quotes
        if (value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\''))
        {
            value = value[1..value.len() - 1].to_string();
        }

        match key {
            "port" | "listen_port" => {
                if let Ok(v) = value.parse() {
                    config.listen_port = v;
                }
            }
            "listen_host" | "host" => config.listen_host = value,
            "auth_enabled" => {
                config.auth_enabled = matches!(value.as_str(), "true" | "1" | "yes");
            }
            "db_path" => config.db_path = value,
            "log_level" => config.log_level = value,
            "head_read_timeout" | "head_read_timeout_secs" => {
                if let Ok(v) = value.parse() {
                    config.head_read_timeout_secs = v;
                }
            }
            "connect_timeout" | "connect_timeout_secs" => {
                if let Ok(v) = value.parse() {
                    config.connect_timeout_secs = v;
                }
            }
            "idle_tunnel_timeout" | "idle_tunnel_timeout_secs" => {
                if let Ok(v) = value.parse() {
                    config.idle_tunnel_timeout_secs = v;
                }
            }
            "admin_port" => {
                if let Ok(v) = value.parse() {
                    config.admin_port = Some(v);
                }
            }
            _ => {}
        }
    }
}

fn apply_env(config: &mut Config) {
    if let Ok(v) = std::env::var("AUTHPROXY_PORT")
        && let Ok(p) = v.parse()
    {
        config.listen_port = p;
    }
    if let Ok(v) = std::env::var("AUTHPROXY_HOST") {
        config.listen_host = v;
    }
    if let Ok(v) = std::env::var("AUTHPROXY_AUTH_ENABLED") {
        config.auth_enabled = matches!(v.as_str(), "true" | "1" | "yes");
    }
    if let Ok(v) = std::env::var("AUTHPROXY_DB_PATH") {
        config.db_path = v;
    }
    if let Ok(v) = std::env::var("AUTHPROXY_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Ok(v) = std::env::var("AUTHPROXY_HEAD_READ_TIMEOUT")
        && let Ok(t) = v.parse()
    {
        config.head_read_timeout_secs = t;
    }
    if let Ok(v) = std::env::var("AUTHPROXY_CONNECT_TIMEOUT")
        && let Ok(t) = v.parse()
    {
        config.connect_timeout_secs = t;
    }
    if let Ok(v) = std::env::var("AUTHPROXY_IDLE_TUNNEL_TIMEOUT")
        && let Ok(t) = v.parse()
    {
        config.idle_tunnel_timeout_secs = t;
    }
    if let Ok(v) = std::env::var("AUTHPROXY_ADMIN_PORT")
        && let Ok(p) = v.parse()
    {
        config.admin_port = Some(p);
    }
}
