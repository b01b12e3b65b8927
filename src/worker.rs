//! Per-connection worker loop (§4.4).
//!
//! One worker task runs this function per dequeued socket: read the
//! request, consult the cache, and either serve the hit or dispatch
//! to the request handler on a miss. The socket is always shut down
//! and the connection gate decremented on the way out, regardless of
//! which branch was taken.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::{CONNECTION_TIMEOUT, MAX_BYTES};
use crate::engine::Engine;
use crate::request::ParsedRequest;
use crate::response;

/// Reads one request off `client`, answers it, and tears the
/// connection down. Always decrements the connection gate before
/// returning, however it exits.
pub async fn handle_connection(engine: &Engine, mut client: TcpStream, peer: SocketAddr) {
    let started = Instant::now();
    let outcome = serve(engine, &mut client, peer).await;

    let _ = client.shutdown().await;
    engine.gate.release();

    if let Some((bytes_served, was_hit)) = outcome {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        engine.stats.record_request(bytes_served, elapsed_ms, was_hit);
    }
}

/// Returns `Some((bytes_served, was_cache_hit))` for anything that
/// reached the point of writing a real response; `None` for
/// connections that never produced a countable request (e.g. the
/// client closed before sending one).
async fn serve(engine: &Engine, client: &mut TcpStream, peer: SocketAddr) -> Option<(u64, bool)> {
    let buffer = match read_request(client).await {
        Some(buf) => buf,
        None => return None,
    };

    let raw_key = Bytes::copy_from_slice(&buffer);

    if let Some(cached) = engine.cache.lookup(&raw_key).await {
        let written = write_in_chunks(client, &cached).await;
        debug!(%peer, bytes = written, "cache hit");
        return Some((written as u64, true));
    }

    let req = match ParsedRequest::parse(&buffer) {
        Ok(req) => req,
        Err(_) => {
            write_all_best_effort(client, &response::error_response(400)).await;
            return Some((0, false));
        }
    };

    if req.method != "GET" || req.host.is_empty() || req.path.is_empty() {
        write_all_best_effort(client, &response::error_response(501)).await;
        return Some((0, false));
    }

    match crate::handler::fetch_and_stream(&req, &raw_key, client, &engine.pool, &engine.cache)
        .await
    {
        Ok(outcome) => {
            info!(%peer, host = req.host.as_str(), path = req.path.as_str(), bytes = outcome.bytes_served, admitted = outcome.admitted, "cache miss served");
            Some((outcome.bytes_served, false))
        }
        Err(e) => {
            debug!(%peer, error = %e, "upstream failure before any byte forwarded");
            write_all_best_effort(client, &response::error_response(e.status_code())).await;
            Some((0, false))
        }
    }
}

/// Reads until `\r\n\r\n` is seen, the socket closes, or `MAX_BYTES`
/// has been read without a terminator (§4.4 step 1, §8 boundary
/// case). Returns `None` if the client sent nothing at all.
async fn read_request(client: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buffer = BytesMut::with_capacity(MAX_BYTES);

    loop {
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buffer.len() >= MAX_BYTES {
            break;
        }

        match timeout(CONNECTION_TIMEOUT, client.read_buf(&mut buffer)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }

    if buffer.is_empty() {
        None
    } else {
        Some(buffer.to_vec())
    }
}

async fn write_in_chunks(client: &mut TcpStream, payload: &Bytes) -> usize {
    let mut written = 0;
    for chunk in payload.chunks(MAX_BYTES) {
        if client.write_all(chunk).await.is_err() {
            break;
        }
        written += chunk.len();
    }
    written
}

async fn write_all_best_effort(client: &mut TcpStream, bytes: &[u8]) {
    let _ = client.write_all(bytes).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn read_request_returns_none_on_immediate_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client_task = tokio::spawn(async move {
            let (mut server_side, _) = listener.accept().await.unwrap();
            read_request(&mut server_side).await
        });
        let client = TcpStream::connect(addr).await.unwrap();
        drop(client);
        assert!(client_task.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_request_stops_at_terminator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_task = tokio::spawn(async move {
            let (mut server_side, _) = listener.accept().await.unwrap();
            read_request(&mut server_side).await
        });
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let got = server_task.await.unwrap().unwrap();
        assert!(got.ends_with(b"\r\n\r\n"));
    }
}
