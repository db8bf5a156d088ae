use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use tracing::warn;

/// Response-writing capability handed to handlers.
///
/// Mirrors the usual transport contract: headers may be mutated until the
/// status is written, the first `write_header` is the one that counts, and a
/// `write` without a prior status implies `200 OK`.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);

    /// Append body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Media type the wrapping handler was configured to emit, if any.
    fn content_type(&self) -> Option<&str> {
        None
    }
}

/// In-memory transport writer that turns into an `http::Response`.
///
/// Headers are frozen when the status is written; later header edits are
/// not part of the response, as on a real connection.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<StatusCode>,
    headers: HeaderMap,
    sent_headers: Option<HeaderMap>,
    body: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> Response<Bytes> {
        let status = self.status.unwrap_or(StatusCode::OK);
        let headers = self.sent_headers.unwrap_or(self.headers);
        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseWriter for ResponseBuffer {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if let Some(current) = self.status {
            warn!(current = %current, ignored = %status, "Superfluous write_header call");
            return;
        }
        self.status = Some(status);
        self.sent_headers = Some(self.headers.clone());
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        buf.len()
    }
}

/// Decorator that records what the inner handler did to the response.
///
/// Every call is forwarded unchanged. The captured status is the first one
/// written (first write wins), which is the one that reaches the client.
pub struct ObservingWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    content_type: Option<&'a HeaderValue>,
    status: Option<StatusCode>,
    bytes_written: u64,
}

impl<'a> ObservingWriter<'a> {
    /// Wrap `inner`, applying `content_type` to the outgoing headers.
    pub fn new(inner: &'a mut dyn ResponseWriter, content_type: Option<&'a HeaderValue>) -> Self {
        if let Some(ct) = content_type {
            inner.headers_mut().insert(header::CONTENT_TYPE, ct.clone());
        }
        Self {
            inner,
            content_type,
            status: None,
            bytes_written: 0,
        }
    }

    pub fn has_status(&self) -> bool {
        self.status.is_some()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl ResponseWriter for ObservingWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let n = self.inner.write(buf);
        self.bytes_written += n as u64;
        n
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type
            .and_then(|ct| ct.to_str().ok())
            .or_else(|| self.inner.content_type())
    }
}
