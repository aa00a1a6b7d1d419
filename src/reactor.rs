// src/reactor.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::net::SocketAddrV4;

use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP};

use crate::config::Config;
use crate::conn::Conn;
use crate::error::EtudeResult;
use crate::metrics::ServerMetrics;
use crate::pool::{Task, ThreadPool};
use crate::store::CredentialStore;
use crate::syscalls::{self, Epoll};

/// State shared between the reactor thread and the worker pool: the epoll
/// instance, the connection table, the credential store, and the counters.
pub struct ServerShared {
    pub epoll: Epoll,
    pub conns: Box<[Mutex<Conn>]>,
    pub metrics: ServerMetrics,
    pub store: Box<dyn CredentialStore>,
    pub config: Config,
    pub shutdown: AtomicBool,
}

/// One parse-and-respond unit handed to the pool. The fd doubles as the
/// table index; a slot that was closed and reused in the meantime no longer
/// matches and the task becomes a no-op.
pub struct ConnTask {
    shared: Arc<ServerShared>,
    fd: i32,
}

impl Task for ConnTask {
    fn process(self) {
        let mut conn = self.shared.conns[self.fd as usize]
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if conn.fd() == self.fd {
            conn.process(&self.shared);
        }
    }
}

/// The event loop. Owns the listening socket and dispatches readiness
/// events: new connections are accepted and registered one-shot, reads are
/// drained and handed to the pool, writes run inline on this thread.
pub struct Reactor {
    shared: Arc<ServerShared>,
    listen_fd: i32,
    pool: ThreadPool<ConnTask>,
    local_port: u16,
}

impl Reactor {
    pub fn bind(config: Config, store: Box<dyn CredentialStore>) -> EtudeResult<Self> {
        let addr = SocketAddrV4::new(config.host, config.port);
        let listen_fd = syscalls::create_listen_socket(addr, config.backlog)?;
        let local_port = syscalls::local_port(listen_fd)?;

        let epoll = Epoll::new()?;
        // The listener is edge-triggered but never one-shot; connections are.
        epoll.add(listen_fd, EPOLLIN, false)?;

        let mut conns = Vec::with_capacity(config.max_connections);
        for _ in 0..config.max_connections {
            conns.push(Mutex::new(Conn::empty()));
        }

        let pool = ThreadPool::new(config.workers, config.max_queue)?;

        let shared = Arc::new(ServerShared {
            epoll,
            conns: conns.into_boxed_slice(),
            metrics: ServerMetrics::new(),
            store,
            config,
            shutdown: AtomicBool::new(false),
        });

        Ok(Self {
            shared,
            listen_fd,
            pool,
            local_port,
        })
    }

    pub fn shared(&self) -> Arc<ServerShared> {
        Arc::clone(&self.shared)
    }

    /// Port actually bound; meaningful when the config asked for port 0.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Run the dispatch loop until the shutdown flag is raised, then drain
    /// the worker pool.
    pub fn run(self) -> EtudeResult<()> {
        let Reactor {
            shared,
            listen_fd,
            pool,
            local_port,
        } = self;

        let mut events = vec![
            libc::epoll_event { events: 0, u64: 0 };
            shared.config.max_events
        ];
        tracing::info!(
            port = local_port,
            workers = shared.config.workers,
            doc_root = %shared.config.doc_root.display(),
            "server listening"
        );

        while !shared.shutdown.load(Ordering::Acquire) {
            // The timeout only bounds how long a shutdown request can go
            // unnoticed; an interrupted wait reports zero events.
            let n = shared.epoll.wait(&mut events, 1000)?;
            for event in &events[..n] {
                let fd = event.u64 as i32;
                let kinds = event.events;
                if fd == listen_fd {
                    accept_pending(&shared, listen_fd);
                } else if kinds & (EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32 != 0 {
                    close_conn(&shared, fd);
                } else if kinds & EPOLLIN as u32 != 0 {
                    handle_readable(&shared, &pool, fd);
                } else if kinds & EPOLLOUT as u32 != 0 {
                    handle_writable(&shared, fd);
                }
            }
        }

        tracing::info!("reactor loop exited, draining workers");
        pool.shutdown();
        syscalls::close_fd(listen_fd);
        Ok(())
    }
}

fn lock_conn(shared: &ServerShared, fd: i32) -> MutexGuard<'_, Conn> {
    shared.conns[fd as usize]
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Accept until the backlog is drained, claiming a table slot per socket.
fn accept_pending(shared: &ServerShared, listen_fd: i32) {
    loop {
        match syscalls::accept_connection(listen_fd) {
            Ok(Some((fd, peer))) => {
                if shared.metrics.active() >= shared.config.max_connections
                    || fd as usize >= shared.conns.len()
                {
                    tracing::warn!(%peer, "connection ceiling reached, rejecting");
                    syscalls::close_fd(fd);
                    continue;
                }
                // Claim the slot before registering so an immediate event
                // cannot observe a stale record.
                let mut conn = lock_conn(shared, fd);
                conn.open(fd, peer);
                match shared.epoll.add(fd, EPOLLIN, true) {
                    Ok(()) => {
                        shared.metrics.inc_conn();
                        tracing::debug!(%peer, fd, "accepted connection");
                    }
                    Err(e) => {
                        tracing::warn!(%peer, error = %e, "epoll registration failed");
                        conn.release();
                        syscalls::close_fd(fd);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                break;
            }
        }
    }
}

/// Drain the socket on the reactor thread, then hand the parse work to the
/// pool. A full queue drops the connection; that is the only back-pressure.
fn handle_readable(shared: &Arc<ServerShared>, pool: &ThreadPool<ConnTask>, fd: i32) {
    let ok = {
        let mut conn = lock_conn(shared, fd);
        if conn.fd() != fd {
            return;
        }
        conn.read_input()
    };
    if !ok {
        close_conn(shared, fd);
        return;
    }
    let task = ConnTask {
        shared: Arc::clone(shared),
        fd,
    };
    if let Err(e) = pool.submit(task) {
        tracing::warn!(fd, error = %e, "dropping connection");
        close_conn(shared, fd);
    }
}

/// Writes of already-prepared segments are short and non-blocking, so they
/// run inline instead of taking a trip through the pool.
fn handle_writable(shared: &ServerShared, fd: i32) {
    let keep = {
        let mut conn = lock_conn(shared, fd);
        if conn.fd() != fd {
            return;
        }
        conn.write_step(&shared.epoll, &shared.metrics)
    };
    if !keep {
        close_conn(shared, fd);
    }
}

fn close_conn(shared: &ServerShared, fd: i32) {
    if fd < 0 || fd as usize >= shared.conns.len() {
        return;
    }
    let mut conn = lock_conn(shared, fd);
    conn.close(&shared.epoll, &shared.metrics);
}
