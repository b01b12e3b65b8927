//! HTTP/1.x request-line and header parsing (§4.1).
//!
//! The parser works on a buffer already known to contain a complete
//! header block (the worker guarantees this before calling
//! [`ParsedRequest::parse`]). It mirrors the contract of the proxy's
//! C ancestor's `ParsedRequest`/`ParsedHeader` pair: request-target may
//! be absolute (`http://host[:port]/path`) or origin-form (`/path`),
//! headers are a name/value list with case-insensitive lookup, and a
//! missing `Host` header on an origin-form target is a parse failure.
//!
//! Header-block tokenizing is delegated to `httparse`; only the
//! proxy-specific target splitting and `Host` fallback are hand-rolled.

use crate::error::ProxyError;

/// A single (name, value) header pair, order-preserving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub protocol: Option<String>,
    pub host: String,
    pub port: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<Header>,
}

impl ParsedRequest {
    /// Parses a raw request buffer per §4.1. Returns
    /// `ProxyError::MalformedRequest` on any of: no method token, no
    /// version token, or a missing host (neither an absolute-form URL
    /// nor a `Host` header supplies one).
    pub fn parse(buf: &[u8]) -> Result<Self, ProxyError> {
        let mut raw_headers = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut raw_headers);

        let status = req.parse(buf).map_err(|_| ProxyError::MalformedRequest)?;
        if status.is_partial() {
            return Err(ProxyError::MalformedRequest);
        }

        let method = req.method.ok_or(ProxyError::MalformedRequest)?.to_string();
        let target = req.path.ok_or(ProxyError::MalformedRequest)?;
        let version = match req.version {
            Some(0) => "HTTP/1.0".to_string(),
            Some(1) => "HTTP/1.1".to_string(),
            _ => return Err(ProxyError::MalformedRequest),
        };

        let (protocol, mut host, mut port, path) = split_target(target);

        let headers: Vec<Header> = req
            .headers
            .iter()
            .map(|h| Header {
                name: h.name.to_string(),
                value: String::from_utf8_lossy(h.value).trim().to_string(),
            })
            .collect();

        if host.is_empty() {
            match get_header(&headers, "Host") {
                Some(host_header) => {
                    if let Some((h, p)) = host_header.rsplit_once(':') {
                        host = h.to_string();
                        port = p.to_string();
                    } else {
                        host = host_header.to_string();
                        if port.is_empty() {
                            port = "80".to_string();
                        }
                    }
                }
                None => return Err(ProxyError::MalformedRequest),
            }
        }

        if port.is_empty() {
            port = "80".to_string();
        }

        Ok(ParsedRequest {
            method,
            protocol,
            host,
            port,
            path,
            version,
            headers,
        })
    }

    /// Case-insensitive header lookup; most-recently-set value wins.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        get_header(&self.headers, name)
    }

    /// Sets a header, overwriting any existing occurrence by name
    /// (case-insensitive) rather than appending a duplicate.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(h) = self
            .headers
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(name))
        {
            h.value = value.to_string();
        } else {
            self.headers.push(Header {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// Serializes the headers as `Name: Value\r\n` lines followed by a
    /// trailing blank line, appending to `out`.
    pub fn write_headers(&self, out: &mut String) {
        for h in &self.headers {
            out.push_str(&h.name);
            out.push_str(": ");
            out.push_str(&h.value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
    }

    pub fn port_number(&self) -> u16 {
        self.port.parse().unwrap_or(80)
    }
}

fn get_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Splits the request-target into (protocol, host, port, path).
/// Origin-form targets (no `http://` prefix) leave protocol/host/port
/// empty; the caller falls back to the `Host` header.
fn split_target(target: &str) -> (Option<String>, String, String, String) {
    if let Some(rest) = target.strip_prefix("http://") {
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_string()),
            None => (rest, "/".to_string()),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (h.to_string(), p.to_string()),
            None => (authority.to_string(), "80".to_string()),
        };
        (Some("http".to_string()), host, port, path)
    } else {
        let path = if target.is_empty() {
            "/".to_string()
        } else {
            target.to_string()
        };
        (None, String::new(), String::new(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_form() {
        let req = ParsedRequest::parse(b"GET http://example.com:8080/a/b HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, "8080");
        assert_eq!(req.path, "/a/b");
        assert_eq!(req.version, "HTTP/1.1");
    }

    #[test]
    fn absolute_form_defaults_path_and_port() {
        let req = ParsedRequest::parse(b"GET http://example.com HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, "80");
        assert_eq!(req.path, "/");
    }

    #[test]
    fn origin_form_falls_back_to_host_header() {
        let req =
            ParsedRequest::parse(b"GET /index.html HTTP/1.1\r\nHost: example.com:9090\r\n\r\n")
                .unwrap();
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, "9090");
        assert_eq!(req.path, "/index.html");
    }

    #[test]
    fn origin_form_without_host_header_is_malformed() {
        let result = ParsedRequest::parse(b"GET /index.html HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ProxyError::MalformedRequest)));
    }

    #[test]
    fn absolute_form_host_wins_over_host_header() {
        let req = ParsedRequest::parse(
            b"GET http://origin.example/a HTTP/1.1\r\nHost: decoy.example\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.host, "origin.example");
    }

    #[test]
    fn missing_method_is_malformed() {
        assert!(ParsedRequest::parse(b"\r\n\r\n").is_err());
    }

    #[test]
    fn missing_version_is_malformed() {
        assert!(ParsedRequest::parse(b"GET /\r\n\r\n").is_err());
    }

    #[test]
    fn header_lookup_is_case_insensitive_and_last_write_wins() {
        let req = ParsedRequest::parse(
            b"GET /a HTTP/1.1\r\nHost: a.example\r\nX-Flag: one\r\nx-flag: two\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.get_header("X-FLAG"), Some("two"));
    }

    #[test]
    fn set_header_overwrites_existing_rather_than_duplicating() {
        let mut req =
            ParsedRequest::parse(b"GET /a HTTP/1.1\r\nHost: a.example\r\nConnection: close\r\n\r\n")
                .unwrap();
        let before = req.headers.len();
        req.set_header("Connection", "keep-alive");
        assert_eq!(req.headers.len(), before);
        assert_eq!(req.get_header("Connection"), Some("keep-alive"));
    }

    #[test]
    fn round_trip_parse_serialize_parse() {
        let original =
            ParsedRequest::parse(b"GET /x HTTP/1.1\r\nHost: h.example\r\nAccept: */*\r\n\r\n")
                .unwrap();
        let mut serialized = format!("{} {} {}\r\n", original.method, original.path, original.version);
        original.write_headers(&mut serialized);
        let reparsed = ParsedRequest::parse(serialized.as_bytes()).unwrap();
        assert_eq!(reparsed.method, original.method);
        assert_eq!(reparsed.path, original.path);
        assert_eq!(reparsed.version, original.version);
        assert_eq!(reparsed.headers, original.headers);
    }
}
