use std::sync::Arc;
use tracing::{error, info, warn};

use fetchkeep::config::Config;
use fetchkeep::engine::{self, Engine};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fetchkeep=info".parse()?),
        )
        .init();

    let config = Config::from_args();

    info!("fetchkeep - concurrent HTTP/1.1 caching proxy");
    info!("listening on port {}", config.port);
    info!("max clients: {}", fetchkeep::config::MAX_CLIENTS);
    info!("worker pool size: {}", fetchkeep::config::THREAD_POOL_SIZE);
    info!(
        "cache budget: {} MiB total, {} MiB per entry",
        fetchkeep::config::MAX_SIZE / 1024 / 1024,
        fetchkeep::config::MAX_ELEMENT_SIZE / 1024 / 1024
    );

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind port {}: {}", config.port, e);
            std::process::exit(1);
        }
    };

    let socket_ref = socket2::SockRef::from(&listener);
    let _ = socket_ref.set_reuse_address(true);
    let _ = socket_ref.set_keepalive(true);

    let engine = Engine::new();
    let worker_handles = engine.spawn_workers();
    let maintenance_handle = tokio::spawn(Arc::clone(&engine).run_maintenance_loop());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, initiating graceful shutdown");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, initiating graceful shutdown");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((client, addr)) => {
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            engine::admit_or_reject(&engine, client, addr).await;
                        });
                    }
                    Err(e) => {
                        warn!("failed to accept connection: {}", e);
                    }
                }
            }
        }
    }

    engine.begin_shutdown().await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    maintenance_handle.abort();

    info!("all workers drained, shutting down");
    engine.final_stats().await;

    Ok(())
}
