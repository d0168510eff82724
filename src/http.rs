//! The strict HTTP/1.1 subset the connection protocol speaks: keep-alive
//! by default, `Connection: close` honored, a required `Content-Length`
//! on every body, and no chunked transfer encoding.

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::ConnectionError;

#[derive(Clone, Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Request {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// `true` once this request has requested the connection be closed
    /// after the response is sent.
    #[must_use]
    pub fn wants_close(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }
}

/// An outgoing HTTP response. Always carries an explicit `Content-Length`.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl Response {
    #[must_use]
    pub fn json(status: u16, reason: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            reason,
            content_type: "application/hap+json",
            body: Bytes::from(body),
        }
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self {
            status: 204,
            reason: "No Content",
            content_type: "application/hap+json",
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn empty_status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            content_type: "application/hap+json",
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn image(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "image/jpeg",
            body: Bytes::from(body),
        }
    }

    /// Serializes the status line, headers, and body for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Builds the pseudo-HTTP `EVENT/1.0` frame.
#[must_use]
pub fn event_frame(body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "EVENT/1.0 200 OK\r\nContent-Type: application/hap+json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// Incremental HTTP/1.1 request parser, used as a `tokio_util` [`Decoder`]
/// over either the cleartext or the decrypted secure-channel byte stream.
#[derive(Debug, Default)]
pub struct HttpDecoder;

impl Decoder for HttpDecoder {
    type Item = Request;
    type Error = ConnectionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header_end = match find_header_end(src) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let (method, path, headers) = parse_head(&src[..header_end])?;

        if headers.contains_key("transfer-encoding") {
            return Err(ConnectionError::MalformedHttp(
                "chunked transfer encoding is not supported".into(),
            ));
        }

        let content_length: usize = match headers.get("content-length") {
            Some(v) => v
                .parse()
                .map_err(|_| ConnectionError::MalformedHttp("invalid Content-Length".into()))?,
            None => 0,
        };

        let body_start = header_end + 4;
        let total_len = body_start + content_length;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let body = Bytes::copy_from_slice(&src[body_start..total_len]);
        src.advance(total_len);

        Ok(Some(Request {
            method,
            path,
            headers,
            body,
        }))
    }
}

fn find_header_end(src: &BytesMut) -> Option<usize> {
    src.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(head: &[u8]) -> Result<(String, String, HashMap<String, String>), ConnectionError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ConnectionError::MalformedHttp("request head is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .ok_or_else(|| ConnectionError::MalformedHttp("missing request line".into()))?;
    let mut parts = request_line.split(' ');
    let method = parts
        .next()
        .ok_or_else(|| ConnectionError::MalformedHttp("missing HTTP method".into()))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| ConnectionError::MalformedHttp("missing request path".into()))?
        .to_string();
    let version = parts.next().unwrap_or("");
    if !version.is_empty() && version != "HTTP/1.1" && version != "HTTP/1.0" {
        return Err(ConnectionError::MalformedHttp(format!(
            "unsupported HTTP version {version:?}"
        )));
    }

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ConnectionError::MalformedHttp(format!("malformed header {line:?}")))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok((method, path, headers))
}
