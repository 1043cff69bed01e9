// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use reqwest::{Method, Request, Url, Version};

use crate::error::HttpUtilError;

/// The captured state of a request body.
enum BodyState {
    /// No body at all (e.g. GET).
    Empty,
    /// An in-memory body, trivially replayable on every attempt.
    Buffered(Bytes),
}

/// A request wrapper that can be replayed across retry attempts.
///
/// `reqwest::Request` does not expose a way to attach arbitrary rewind state
/// (its `extensions` map is crate-private), so instead of mutating one
/// `Request` in place across attempts, `RewindableRequest` decomposes the
/// request once up front and rebuilds a fresh `reqwest::Request` for every
/// attempt from the captured parts.
pub struct RewindableRequest {
    method: Method,
    url: Url,
    headers: reqwest::header::HeaderMap,
    version: Version,
    body: BodyState,
}

impl RewindableRequest {
    /// Captures a request's parts, buffering its body fully into memory if
    /// present.
    ///
    /// # Errors
    /// Returns [`HttpUtilError::NotRewindable`] if the body is a stream
    /// whose bytes cannot be read up front (for example, one built from an
    /// `async_stream` with no buffered bytes available).
    pub fn capture(request: &Request) -> Result<Self, HttpUtilError> {
        let body = match request.body() {
            None => BodyState::Empty,
            Some(body) => match body.as_bytes() {
                Some(bytes) => BodyState::Buffered(Bytes::copy_from_slice(bytes)),
                None => return Err(HttpUtilError::NotRewindable),
            },
        };
        Ok(Self {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            version: request.version(),
            body,
        })
    }

    /// Builds a fresh, independent `reqwest::Request` from the captured
    /// state. Safe to call any number of times, including across retry
    /// attempts, since the captured body is never consumed.
    pub fn rewind(&self) -> Request {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.version_mut() = self.version;
        if let BodyState::Buffered(bytes) = &self.body {
            *request.body_mut() = Some(bytes.clone().into());
        }
        request
    }
}
