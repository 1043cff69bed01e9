// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;

use crate::error::HttpUtilError;

/// An in-memory HTTP response writer.
///
/// The deferred-response timeout handler ([`crate::DeferredTimeoutLayer`])
/// runs the inner handler on a separate cooperative task and captures its
/// response here instead of writing to the caller's connection directly, so
/// that a response which loses the race against the deadline can be
/// discarded wholesale rather than partially delivered.
pub struct BufferedWriter {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: Vec<u8>,
    closed: bool,
}

impl BufferedWriter {
    /// Creates an empty buffer with no status set (defaults to 200 on
    /// flush) and no body.
    pub fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
            status: None,
            body: Vec::new(),
            closed: false,
        }
    }

    /// Captures an already-built response into a buffer, ready to be
    /// replayed onto the real response with [`Self::write_to`].
    pub async fn from_response(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();
        Self {
            headers: parts.headers,
            status: Some(parts.status),
            body: bytes.to_vec(),
            closed: false,
        }
    }

    /// Mutable access to the buffered headers (`Header()` in the spec).
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets the response status. Idempotent: once a status has been set,
    /// further calls are ignored, matching `http.ResponseWriter.WriteHeader`.
    ///
    /// # Panics
    /// Panics if `status` is outside the 100..=999 range.
    pub fn write_header(&mut self, status: u16) {
        let status = StatusCode::from_u16(status).expect("status code must be in 100..=999");
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    /// Appends bytes to the buffered body.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, HttpUtilError> {
        if self.closed {
            return Err(HttpUtilError::WriterClosed);
        }
        self.body.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Flushes the buffered headers, status, and body onto a real
    /// `axum::response::Response`, then marks the writer closed.
    pub fn write_to(&mut self) -> Result<Response, HttpUtilError> {
        if self.closed {
            return Err(HttpUtilError::WriterClosed);
        }
        let mut builder = Response::builder().status(self.status.unwrap_or(StatusCode::OK));
        if let Some(headers) = builder.headers_mut() {
            *headers = std::mem::take(&mut self.headers);
            if !self.body.is_empty() {
                headers.insert(
                    header::CONTENT_LENGTH,
                    HeaderValue::from_str(&self.body.len().to_string())
                        .expect("decimal length is always a valid header value"),
                );
            }
        }
        let response = builder
            .body(Body::from(std::mem::take(&mut self.body)))
            .expect("status and headers were validated when they were set");
        self.closed = true;
        Ok(response)
    }

    /// Idempotent close: the first call succeeds, every subsequent call
    /// reports [`HttpUtilError::WriterClosed`].
    pub fn close(&mut self) -> Result<(), HttpUtilError> {
        if self.closed {
            return Err(HttpUtilError::WriterClosed);
        }
        self.closed = true;
        Ok(())
    }
}

impl Default for BufferedWriter {
    fn default() -> Self {
        Self::new()
    }
}
