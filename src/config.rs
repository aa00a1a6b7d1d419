// src/config.rs
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration. The listening port comes from the command line;
/// everything else is environment-driven (with `.env` support) and defaults
/// to the compiled-in values of the original deployment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind, `HOST` (default 0.0.0.0).
    pub host: Ipv4Addr,
    /// Listening port, required on the command line. `0` picks an ephemeral
    /// port, which the test suite relies on.
    pub port: u16,
    /// Static document root, `DOC_ROOT` (default `resources`).
    pub doc_root: PathBuf,
    /// Worker thread count, `WORKERS` (default 8, `0` = one per core).
    pub workers: usize,
    /// Maximum queued tasks before submissions are rejected, `MAX_QUEUE`.
    pub max_queue: usize,
    /// Ceiling on concurrently tracked connections, `MAX_CONNECTIONS`.
    pub max_connections: usize,
    /// Upper bound on readiness events retrieved per wait.
    pub max_events: usize,
    /// Listen backlog, `LISTEN_BACKLOG`.
    pub backlog: i32,
    /// SQLite database path, `DATABASE_PATH`.
    pub database_path: String,
}

impl Config {
    pub fn from_env(port: u16) -> Self {
        // Load .env if present; a missing file is not an error.
        let _ = dotenvy::dotenv();

        let mut workers = env_or("WORKERS", 8usize);
        if workers == 0 {
            workers = num_cpus::get();
        }

        Self {
            host: env_or("HOST", Ipv4Addr::UNSPECIFIED),
            port,
            doc_root: PathBuf::from(
                std::env::var("DOC_ROOT").unwrap_or_else(|_| "resources".to_string()),
            ),
            workers,
            max_queue: env_or("MAX_QUEUE", 10_000),
            max_connections: env_or("MAX_CONNECTIONS", 65_536),
            max_events: 10_000,
            backlog: env_or("LISTEN_BACKLOG", 5),
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "users.db".to_string()),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
