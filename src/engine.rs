//! The `Engine`: owned, shareable home for everything the reference
//! design keeps as process-wide singletons — cache, upstream pool,
//! request queue, connection-limit gate, and statistics (§9 "Global
//! mutable state"). The acceptor and every worker hold an `Arc<Engine>`
//! rather than reaching into statics.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::cache::Cache;
use crate::config::{MAX_CLIENTS, QUEUE_SIZE, THREAD_POOL_SIZE};
use crate::pool::ConnectionPool;
use crate::stats::Stats;
use crate::worker;

/// An accepted client socket plus its peer address, queued for a
/// worker (§3 "Work item").
pub type WorkItem = (TcpStream, SocketAddr);

/// Hard-reject admission counter (§4.6). No blocking: a full gate
/// is refused immediately with 503, matching the reference design.
pub struct ConnectionGate {
    count: AtomicUsize,
    max: usize,
}

impl ConnectionGate {
    fn new(max: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            max,
        }
    }

    /// Attempts to admit one more connection. Returns `false` without
    /// mutating state if the gate is already at capacity.
    pub fn try_acquire(&self) -> bool {
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current >= self.max {
                return false;
            }
            if self
                .count
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn release(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn active(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

pub struct Engine {
    pub cache: Cache,
    pub pool: ConnectionPool,
    pub stats: Stats,
    pub gate: ConnectionGate,
    // `None` once shutdown begins. Holding the sender behind its own
    // std `Mutex` (locked only long enough to clone it, never across
    // an `.await`) lets `begin_shutdown` drop the last sender without
    // contending with `queue_rx`'s lock — a worker parked in
    // `queue_rx.lock().await.recv().await` never holds this one.
    queue_tx: std::sync::Mutex<Option<mpsc::Sender<WorkItem>>>,
    queue_rx: Mutex<mpsc::Receiver<WorkItem>>,
    shutting_down: AtomicBool,
}

impl Engine {
    pub fn new() -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_SIZE);
        Arc::new(Self {
            cache: Cache::new(),
            pool: ConnectionPool::new(),
            stats: Stats::new(),
            gate: ConnectionGate::new(MAX_CLIENTS),
            queue_tx: std::sync::Mutex::new(Some(queue_tx)),
            queue_rx: Mutex::new(queue_rx),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Enqueues an accepted socket. Blocks (applying backpressure to
    /// the acceptor) while the queue is full, per §4.4. Fails
    /// immediately once shutdown has begun and the sender is gone.
    pub async fn submit(&self, item: WorkItem) -> Result<(), WorkItem> {
        let tx = self.queue_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(item).await.map_err(|e| e.0),
            None => Err(item),
        }
    }

    /// Spawns the fixed worker pool. Each worker shares the single
    /// receiver behind a mutex — `mpsc` itself is single-consumer, so
    /// this is the standard way to fan a bounded channel out across
    /// several tasks.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..THREAD_POOL_SIZE)
            .map(|id| {
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    loop {
                        let item = {
                            let mut rx = engine.queue_rx.lock().await;
                            rx.recv().await
                        };
                        match item {
                            Some((client, peer)) => {
                                worker::handle_connection(&engine, client, peer).await;
                            }
                            None => {
                                info!(worker_id = id, "worker exiting, queue closed");
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Flags shutdown and drops the last request-queue sender so every
    /// worker's `recv()` — whether idle or mid-wait — wakes with
    /// `None` once the queue drains, instead of blocking forever
    /// (§5 shutdown). Dropping the sender, rather than locking and
    /// closing the shared receiver, avoids contending with a worker
    /// that is parked holding the receiver's lock across `recv().await`.
    pub async fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.queue_tx.lock().unwrap().take();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Periodic maintenance: prints/logs a stats summary and sweeps
    /// idle upstream connections, every `STATS_INTERVAL` until
    /// shutdown begins.
    pub async fn run_maintenance_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(crate::stats::SUMMARY_INTERVAL);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            if self.is_shutting_down() {
                break;
            }
            self.pool.cleanup_stale_connections().await;
            self.stats
                .print_summary(self.cache.total_size(), self.pool.stats().await.values().sum());
        }
    }

    pub async fn final_stats(&self) {
        self.stats
            .print_summary(self.cache.total_size(), self.pool.stats().await.values().sum());
    }
}

/// Attempts to admit `addr`, hard-rejecting with 503 when the gate is
/// full (§4.6). Returns `true` if the connection was handed off to
/// the engine for processing.
pub async fn admit_or_reject(engine: &Arc<Engine>, client: TcpStream, addr: SocketAddr) -> bool {
    if !engine.gate.try_acquire() {
        warn!(%addr, active = engine.gate.active(), "connection limit reached, rejecting");
        let mut client = client;
        let _ = tokio::io::AsyncWriteExt::write_all(
            &mut client,
            &crate::response::error_response(503),
        )
        .await;
        return false;
    }

    if engine.submit((client, addr)).await.is_err() {
        engine.gate.release();
        return false;
    }
    true
}
