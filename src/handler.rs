//! Miss-path request handler (§4.5): fetch from upstream, stream to
//! the client, and offer the accumulated bytes to the cache.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::config::{CONNECTION_TIMEOUT, MAX_BYTES, MAX_ELEMENT_SIZE, SERVER_BANNER};
use crate::error::ProxyError;
use crate::pool::ConnectionPool;
use crate::request::ParsedRequest;

/// Outcome of handling a cache miss, used by the worker to update
/// statistics.
pub struct FetchOutcome {
    pub bytes_served: u64,
    pub admitted: bool,
}

/// Builds the upstream request line + headers for `req`, rewriting
/// `Host`, `Connection`, and `User-Agent` as the proxy's own (§4.5,
/// §6). Other original headers are forwarded unchanged.
fn build_upstream_request(req: &ParsedRequest) -> String {
    let mut req = req.clone();
    req.set_header("Host", &req.host.clone());
    req.set_header("Connection", "keep-alive");
    req.set_header("User-Agent", SERVER_BANNER);

    let mut out = format!("GET {} {}\r\n", req.path, req.version);
    req.write_headers(&mut out);
    out
}

/// Fetches `req` from its origin, forwarding each chunk to `client`
/// as it arrives and simultaneously accumulating it for cache
/// admission. Returns the number of bytes forwarded and whether the
/// response was admitted. Returns `Err` only if nothing was ever
/// forwarded to the client, so the worker can still answer with 500.
pub async fn fetch_and_stream(
    req: &ParsedRequest,
    raw_key: &Bytes,
    client: &mut TcpStream,
    pool: &ConnectionPool,
    cache: &Cache,
) -> Result<FetchOutcome, ProxyError> {
    let host = req.host.clone();
    let port = req.port_number();

    let mut upstream = pool.get_connection(&host, port).await?;

    let upstream_request = build_upstream_request(req);
    timeout(CONNECTION_TIMEOUT, upstream.write_all(upstream_request.as_bytes()))
        .await
        .map_err(|_| ProxyError::UpstreamTimeout)?
        .map_err(ProxyError::UpstreamSend)?;

    let mut admit_buffer = BytesMut::new();
    let mut bytes_served: u64 = 0;
    let mut forwarded_any = false;
    let mut chunk = vec![0u8; MAX_BYTES];

    loop {
        let n = match timeout(CONNECTION_TIMEOUT, upstream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                if forwarded_any {
                    break;
                }
                return Err(ProxyError::UpstreamRecv(e));
            }
            Err(_) => {
                if forwarded_any {
                    break;
                }
                return Err(ProxyError::UpstreamTimeout);
            }
        };

        if client.write_all(&chunk[..n]).await.is_err() {
            debug!(host = host.as_str(), port, "client write failed mid-stream");
            break;
        }
        forwarded_any = true;
        bytes_served += n as u64;

        if admit_buffer.len() + n <= MAX_ELEMENT_SIZE {
            admit_buffer.extend_from_slice(&chunk[..n]);
        }
    }

    let admitted = if bytes_served > 0 {
        cache.admit(raw_key.clone(), admit_buffer.freeze()).await
    } else {
        false
    };

    if !admitted && bytes_served > 0 {
        warn!(host = host.as_str(), port, "response not admitted to cache");
    }

    pool.return_connection(host, port, upstream).await;

    Ok(FetchOutcome {
        bytes_served,
        admitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_request_rewrites_connection_and_user_agent() {
        let req = ParsedRequest::parse(
            b"GET /a HTTP/1.1\r\nHost: origin.example\r\nConnection: close\r\nX-Trace: abc\r\n\r\n",
        )
        .unwrap();

        let built = build_upstream_request(&req);
        assert!(built.starts_with("GET /a HTTP/1.1\r\n"));
        assert!(built.contains("Host: origin.example\r\n"));
        assert!(built.contains("Connection: keep-alive\r\n"));
        assert!(built.contains(&format!("User-Agent: {SERVER_BANNER}\r\n")));
        assert!(built.contains("X-Trace: abc\r\n"));
        assert!(!built.contains("Connection: close"));
        assert!(built.ends_with("\r\n\r\n"));
    }
}
