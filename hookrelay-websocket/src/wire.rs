//! HTTP/1.1 request framing for relay frames.
//!
//! One frame carries one request: the origin-form request line, the original
//! headers minus `Transfer-Encoding` and `Content-Length`, a recomputed
//! `Content-Length`, a blank line and the body.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, Request};
use thiserror::Error;

const MAX_HEADERS: usize = 128;

/// Errors while decoding a frame into a request.
#[derive(Error, Debug)]
pub enum WireError {
    /// httparse rejected the head
    #[error("malformed request: {0}")]
    Malformed(#[from] httparse::Error),

    /// The head ended before the blank line
    #[error("request head is incomplete")]
    Incomplete,

    /// `Content-Length` was not a number
    #[error("invalid Content-Length")]
    InvalidContentLength,

    /// Fewer body bytes than `Content-Length` announced
    #[error("body truncated: expected {expected} bytes, got {actual}")]
    BodyTruncated {
        /// Announced length
        expected: usize,
        /// Bytes present
        actual: usize,
    },

    /// The parts did not form a valid `http::Request`
    #[error("invalid request: {0}")]
    Invalid(#[from] http::Error),
}

/// Serialize a request into a relay frame payload.
pub fn encode_request(request: &Request<Bytes>) -> Bytes {
    let body = request.body();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    let mut buf = BytesMut::with_capacity(256 + body.len());
    buf.put_slice(request.method().as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(target.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");

    for (name, value) in request.headers() {
        if name == TRANSFER_ENCODING || name == CONTENT_LENGTH {
            continue;
        }
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());
    buf.put_slice(body);
    buf.freeze()
}

/// Parse a relay frame payload back into a request.
///
/// The body is whatever follows the head, cut to `Content-Length` when the
/// header is present.
pub fn decode_request(frame: &[u8]) -> Result<Request<Bytes>, WireError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);

    let head_len = match parsed.parse(frame)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(WireError::Incomplete),
    };

    let mut builder = Request::builder()
        .method(parsed.method.unwrap_or("GET"))
        .uri(parsed.path.unwrap_or("/"));

    let mut content_length = None;
    for header in parsed.headers.iter() {
        if header.name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
            let len = std::str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or(WireError::InvalidContentLength)?;
            content_length = Some(len);
        }
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(http::Error::from)?;
        let value = HeaderValue::from_bytes(header.value).map_err(http::Error::from)?;
        builder = builder.header(name, value);
    }

    let rest = &frame[head_len..];
    let body = match content_length {
        Some(expected) if expected > rest.len() => {
            return Err(WireError::BodyTruncated {
                expected,
                actual: rest.len(),
            });
        }
        Some(expected) => &rest[..expected],
        None => rest,
    };

    Ok(builder.body(Bytes::copy_from_slice(body))?)
}
