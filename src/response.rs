//! Canned error responses the proxy writes itself (§4.4, §7).
//!
//! Every self-generated response carries a `Date` header in RFC 1123
//! form (via `httpdate`), the `Server` banner, and `Connection:
//! keep-alive` so a client reusing the TCP connection sees a
//! consistent framing story regardless of whether the bytes came from
//! the cache, an origin, or the proxy itself.

use crate::config::SERVER_BANNER;

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        _ => "Error",
    }
}

fn body_for(status: u16, reason: &str) -> String {
    format!(
        "<html><head><title>{status} {reason}</title></head>\
         <body><h1>{status} {reason}</h1></body></html>"
    )
}

/// Renders a complete HTTP/1.1 error response for `status`, ready to
/// write directly to the client socket.
pub fn error_response(status: u16) -> Vec<u8> {
    let reason = reason_phrase(status);
    let body = body_for(status, reason);
    let date = httpdate::fmt_http_date(std::time::SystemTime::now());

    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Server: {SERVER_BANNER}\r\n\
         Date: {date}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: keep-alive\r\n\
         \r\n\
         {body}",
        body.len()
    )
    .into_bytes()
}
