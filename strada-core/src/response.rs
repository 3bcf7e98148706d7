use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};

/// Buffered response writer owned by a pooled context.
///
/// Tracks status and byte count natively, so the "response-info" capability
/// the observability hooks rely on needs no extra wrapping layer. The body
/// buffer keeps its capacity across pool reuse.
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    bytes_written: u64,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            bytes_written: 0,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Append bytes to the body buffer. Returns the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.body.extend_from_slice(data);
        self.bytes_written += data.len() as u64;
        data.len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Snapshot of status and byte count for the observability hooks.
    pub fn info(&self) -> ResponseInfo {
        ResponseInfo {
            status: self.status,
            bytes_written: self.bytes_written,
        }
    }

    /// Drain the writer into an `http::Response`, leaving it reset for the
    /// next request.
    pub(crate) fn take_response(&mut self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(std::mem::take(&mut self.body)));
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        self.reset();
        response
    }

    /// Clear status, headers, and counters. The body buffer keeps its
    /// capacity when it has not been drained.
    pub(crate) fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.bytes_written = 0;
    }
}

/// Status code and body byte count of a completed response, handed to
/// `on_request_end`.
#[derive(Clone, Copy, Debug)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub bytes_written: u64,
}
