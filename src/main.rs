// src/main.rs
use std::env;
use std::process;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use etude::config::Config;
use etude::reactor::Reactor;
use etude::store::{CredentialStore, SqliteStore};
use etude::syscalls;

fn main() {
    init_logging();

    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "etude".to_string());
    let Some(port) = args.next().and_then(|p| p.parse::<u16>().ok()) else {
        eprintln!("usage: {} <port>", program);
        process::exit(1);
    };

    // Writing to a peer-closed socket must surface as an error, not a fatal
    // signal.
    syscalls::ignore_sigpipe();

    let config = Config::from_env(port);

    let store: Box<dyn CredentialStore> = match SqliteStore::open(&config.database_path) {
        Ok(store) => Box::new(store),
        Err(e) => {
            tracing::error!(path = %config.database_path, error = %e, "failed to open credential store");
            process::exit(1);
        }
    };

    let reactor = match Reactor::bind(config, store) {
        Ok(reactor) => reactor,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            process::exit(1);
        }
    };

    let shared = reactor.shared();

    let shutdown_shared = Arc::clone(&shared);
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown_shared.shutdown.store(true, Ordering::Release);
    }) {
        tracing::warn!(error = %e, "could not install ctrl-c handler");
    }

    let metrics_shared = Arc::clone(&shared);
    thread::Builder::new()
        .name("etude-metrics".to_string())
        .spawn(move || {
            while !metrics_shared.shutdown.load(Ordering::Acquire) {
                thread::sleep(Duration::from_secs(5));
                tracing::info!(
                    active = metrics_shared.metrics.active_conns.load(Ordering::Relaxed),
                    requests = metrics_shared.metrics.req_count.load(Ordering::Relaxed),
                    bytes = metrics_shared.metrics.bytes_sent.load(Ordering::Relaxed),
                    "server counters"
                );
            }
        })
        .ok();

    if let Err(e) = reactor.run() {
        tracing::error!(error = %e, "reactor failed");
        process::exit(1);
    }
    tracing::info!("server shut down");
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
