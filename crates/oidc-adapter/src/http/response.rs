//! Node-style response collector.
//!
//! The engine writes into a [`ResponseCollector`] using the Node
//! `ServerResponse` surface. When it calls [`ResponseCollector::end`] the
//! collected status, headers and body are handed to the paired
//! [`ResponseCompletion`], which the HTTP layer awaits.

use std::collections::BTreeMap;

use axum::body::{Body, Bytes};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::BridgeError;

/// What happens to a `200` response that carries a `Location` header.
///
/// Some engine paths set `Location` without touching the status and rely on
/// the host framework to turn the response into a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectPolicy {
    /// A `200` with `Location` is sent as `302`.
    #[default]
    UpgradeOnLocation,
    /// The status is sent exactly as written.
    Preserve,
}

impl RedirectPolicy {
    /// Final status for a response about to be sent.
    #[must_use]
    pub fn final_status(self, status: u16, headers: &BTreeMap<String, HeaderField>) -> u16 {
        match self {
            Self::UpgradeOnLocation if status == 200 && headers.contains_key("location") => 302,
            _ => status,
        }
    }
}

/// A header value as set by the engine: a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderField {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderField {
    /// Iterates over every value.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        };
        values.iter().map(String::as_str)
    }

    /// Returns the value if there is exactly one.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(values) if values.len() == 1 => Some(&values[0]),
            Self::Multiple(_) => None,
        }
    }
}

impl From<&str> for HeaderField {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for HeaderField {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<u64> for HeaderField {
    fn from(value: u64) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for HeaderField {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl From<Vec<&str>> for HeaderField {
    fn from(values: Vec<&str>) -> Self {
        Self::Multiple(values.into_iter().map(str::to_string).collect())
    }
}

/// A finished response.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedResponse {
    pub status: u16,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, HeaderField>,
    pub body: Bytes,
}

impl CollectedResponse {
    /// Returns a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderField> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    /// Returns the body as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl IntoResponse for CollectedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = StatusCode::from_u16(self.status).unwrap_or_else(|_| {
            warn!(status = self.status, "Engine wrote an invalid status code");
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let headers = response.headers_mut();
        for (name, field) in &self.headers {
            let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                warn!(header = %name, "Dropping header with invalid name");
                continue;
            };
            for value in field.values() {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.append(header_name.clone(), value);
                    }
                    Err(_) => warn!(header = %name, "Dropping header with invalid value"),
                }
            }
        }
        response
    }
}

/// Receives the response once the engine ends it.
#[derive(Debug)]
pub struct ResponseCompletion {
    rx: oneshot::Receiver<CollectedResponse>,
}

impl ResponseCompletion {
    /// Waits for the engine to end the response.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ResponseAbandoned`] if the collector is dropped
    /// without `end` having been called.
    pub async fn wait(self) -> Result<CollectedResponse, BridgeError> {
        self.rx.await.map_err(|_| BridgeError::ResponseAbandoned)
    }
}

/// Node-style writable response.
#[derive(Debug)]
pub struct ResponseCollector {
    status: u16,
    headers: BTreeMap<String, HeaderField>,
    body: Vec<u8>,
    policy: RedirectPolicy,
    ended: bool,
    completion: Option<oneshot::Sender<CollectedResponse>>,
}

impl ResponseCollector {
    /// Creates a collector with status 200 and its completion handle.
    #[must_use]
    pub fn new(policy: RedirectPolicy) -> (Self, ResponseCompletion) {
        let (tx, rx) = oneshot::channel();
        let collector = Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Vec::new(),
            policy,
            ended: false,
            completion: Some(tx),
        };
        (collector, ResponseCompletion { rx })
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn set_status_code(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// `true` once `end` has been called.
    #[must_use]
    pub fn writable_ended(&self) -> bool {
        self.ended
    }

    pub fn write_head(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets the status and merges `headers` into the current set.
    pub fn write_head_with<K, V>(
        &mut self,
        status: u16,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> &mut Self
    where
        K: AsRef<str>,
        V: Into<HeaderField>,
    {
        self.status = status;
        for (name, value) in headers {
            self.set_header(name.as_ref(), value);
        }
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<HeaderField>) -> &mut Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&HeaderField> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn get_header_names(&self) -> Vec<String> {
        self.headers.keys().cloned().collect()
    }

    #[must_use]
    pub fn get_headers(&self) -> &BTreeMap<String, HeaderField> {
        &self.headers
    }

    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(&name.to_ascii_lowercase());
        self
    }

    /// Appends a body chunk. Ignored after `end`.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> bool {
        if self.ended {
            warn!("Write after end ignored");
            return false;
        }
        self.body.extend_from_slice(chunk.as_ref());
        true
    }

    /// Finishes the response.
    pub fn end(&mut self) {
        if self.ended {
            debug!("Response already ended");
            return;
        }
        self.ended = true;
        self.status = self.policy.final_status(self.status, &self.headers);

        let response = CollectedResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::from(std::mem::take(&mut self.body)),
        };
        if let Some(tx) = self.completion.take()
            && tx.send(response).is_err()
        {
            debug!("Response completed after the caller stopped waiting");
        }
    }

    /// Appends a final chunk, then finishes the response.
    pub fn end_with(&mut self, chunk: impl AsRef<[u8]>) {
        if self.ended {
            warn!("Write after end ignored");
            return;
        }
        self.write(chunk);
        self.end();
    }
}
