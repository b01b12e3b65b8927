//! Concurrent forward HTTP/1.1 caching proxy.
//!
//! See the binary crate (`src/main.rs`) for the acceptor loop and
//! process lifecycle; this library exposes the pieces it assembles.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod pool;
pub mod request;
pub mod response;
pub mod stats;
pub mod worker;
