//! Tunable constants and command-line configuration.
//!
//! A single positional argument (`proxy <port>`) is read directly off
//! `std::env::args()` — a dedicated argument-parsing crate is not
//! warranted for one required integer, and argument parsing as a
//! general capability is out of scope for this crate.

use std::time::Duration;

/// Maximum request buffer read per worker iteration, and the chunk
/// size used when streaming cached or upstream bytes to a client.
pub const MAX_BYTES: usize = 8192;

/// Hard cap on concurrent in-flight client connections.
pub const MAX_CLIENTS: usize = 1200;

/// Number of worker tasks consuming the request queue.
pub const THREAD_POOL_SIZE: usize = 50;

/// Total cache size budget, in bytes.
pub const MAX_SIZE: usize = 200 * 1024 * 1024;

/// Largest single cache entry admitted, in bytes.
pub const MAX_ELEMENT_SIZE: usize = 10 * 1024 * 1024;

/// Bound on the accepted-socket FIFO; also the listen backlog.
pub const QUEUE_SIZE: usize = 2000;

/// Upper bound on establishing a fresh upstream connection.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle upstream connections older than this are dropped instead of reused.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed slot budget for the upstream connection pool across all hosts.
pub const POOL_CAPACITY: usize = 100;

/// How often the acceptor loop emits a statistics summary.
pub const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// `Server:` header value advertised on every response the proxy
/// writes itself (cache hits, error bodies).
pub const SERVER_BANNER: &str = "HighPerformanceProxy/2.0";

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub port: u16,
}

impl Config {
    /// Parses `proxy <port>` from the process argument vector.
    ///
    /// Exits the process with status 1 (after printing a usage line)
    /// on a missing or non-numeric port, matching the reference CLI.
    pub fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        match args.get(1).and_then(|p| p.parse::<u16>().ok()) {
            Some(port) => Config { port },
            None => {
                eprintln!("Usage: {} <port>", args.first().map(String::as_str).unwrap_or("proxy"));
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_spec_budget() {
        assert_eq!(MAX_BYTES, 8192);
        assert_eq!(MAX_CLIENTS, 1200);
        assert_eq!(THREAD_POOL_SIZE, 50);
        assert_eq!(MAX_SIZE, 200 * 1024 * 1024);
        assert_eq!(MAX_ELEMENT_SIZE, 10 * 1024 * 1024);
        assert_eq!(QUEUE_SIZE, 2000);
        assert_eq!(CONNECTION_TIMEOUT, Duration::from_secs(30));
    }
}
