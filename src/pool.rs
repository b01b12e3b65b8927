//! Upstream TCP connection pool (§4.3).
//!
//! Connections are keyed by `(host, port)` and kept warm for reuse
//! across requests. Unlike the reference pool this crate is built
//! from, the budget here is a single cap shared across *all* hosts
//! (`POOL_CAPACITY`), not a per-host cap — a handful of busy origins
//! would otherwise starve everything else of pool slots. Idle
//! connections older than `POOL_IDLE_TIMEOUT` are dropped on return
//! and during the periodic sweep.
//!
//! This pool does **not** probe socket health before handing a
//! connection back out: a half-closed peer is detected naturally by
//! the write/read that follows, and the caller falls back to opening
//! a fresh connection on that failure. See `DESIGN.md`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{CONNECTION_TIMEOUT, POOL_CAPACITY, POOL_IDLE_TIMEOUT};
use crate::error::ProxyError;

type HostKey = (String, u16);

struct PooledConnection {
    stream: TcpStream,
    last_used: Instant,
}

struct Inner {
    pools: HashMap<HostKey, Vec<PooledConnection>>,
    total: usize,
}

/// Pool of idle upstream connections, shared across all workers.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pools: HashMap::new(),
                total: 0,
            })),
        }
    }

    /// Takes a pooled connection to `(host, port)` if one is warm and
    /// fresh enough, otherwise dials a new one bounded by
    /// `CONNECTION_TIMEOUT`.
    pub async fn get_connection(&self, host: &str, port: u16) -> Result<TcpStream, ProxyError> {
        let key = (host.to_string(), port);

        {
            let mut guard = self.inner.lock().await;
            if let Some(pool) = guard.pools.get_mut(&key) {
                while let Some(conn) = pool.pop() {
                    guard.total -= 1;
                    if conn.last_used.elapsed() < POOL_IDLE_TIMEOUT {
                        debug!(host, port, "reusing pooled connection");
                        return Ok(conn.stream);
                    }
                    debug!(host, port, "dropping stale pooled connection");
                }
            }
        }

        debug!(host, port, "dialing new upstream connection");
        timeout(CONNECTION_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout)?
            .map_err(ProxyError::UpstreamConnect)
    }

    /// Returns a connection to the pool for reuse, subject to the
    /// crate-wide `POOL_CAPACITY` budget. Drops the connection (and
    /// lets it close on drop) once that budget is exhausted.
    pub async fn return_connection(&self, host: String, port: u16, stream: TcpStream) {
        let key = (host.clone(), port);
        let mut guard = self.inner.lock().await;

        if guard.total >= POOL_CAPACITY {
            debug!(host, port, "pool at capacity, dropping connection");
            return;
        }

        guard.pools.entry(key).or_insert_with(Vec::new).push(PooledConnection {
            stream,
            last_used: Instant::now(),
        });
        guard.total += 1;
    }

    /// Evicts connections idle past `POOL_IDLE_TIMEOUT`; run
    /// periodically from the stats/maintenance loop.
    pub async fn cleanup_stale_connections(&self) {
        let mut guard = self.inner.lock().await;
        let mut dropped = 0usize;

        for ((host, port), pool) in guard.pools.iter_mut() {
            let before = pool.len();
            pool.retain(|conn| conn.last_used.elapsed() < POOL_IDLE_TIMEOUT);
            let removed = before - pool.len();
            if removed > 0 {
                debug!(host = host.as_str(), port, removed, "swept stale connections");
            }
            dropped += removed;
        }

        guard.pools.retain(|_, pool| !pool.is_empty());
        guard.total -= dropped;
    }

    /// Per-host idle connection counts, for the stats summary.
    pub async fn stats(&self) -> HashMap<HostKey, usize> {
        let guard = self.inner.lock().await;
        guard
            .pools
            .iter()
            .map(|(key, pool)| (key.clone(), pool.len()))
            .collect()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
