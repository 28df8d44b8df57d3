//! Fetch-style request to Node-style request conversion.
//!
//! The protocol engine is written against the classic Node `IncomingMessage`
//! surface. [`RequestBridge`] turns a fully buffered [`http::Request`] into a
//! [`NodeRequest`] carrying the same information: method, prefix-stripped
//! URL, flattened headers, a synthetic socket and an eagerly parsed body.
//!
//! The body is parsed up front and never streamed. [`NodeRequest::on`] fires
//! `"end"` callbacks synchronously on that assumption; introducing real
//! streaming means revisiting that contract.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Request, header};
use cookie::Cookie;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;
use tracing::warn;
use url::form_urlencoded;

use super::BridgeError;
use crate::config::{BridgeConfig, ProviderConfig};

/// Methods whose body is parsed.
pub const BODY_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Eagerly parsed request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`. Repeated keys keep the last value.
    Form(BTreeMap<String, String>),
    /// `application/json` and `+json` media types.
    Json(Value),
    /// Anything else, as UTF-8 text.
    Text(String),
}

impl RequestBody {
    /// Returns a form or JSON string field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Form(map) => map.get(name).map(String::as_str),
            Self::Json(value) => value.get(name).and_then(Value::as_str),
            Self::Text(_) => None,
        }
    }
}

/// Connection details exposed as `req.socket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    pub remote_address: String,
}

/// Node-style view of an inbound request.
#[derive(Debug, Clone)]
pub struct NodeRequest {
    pub method: Method,
    /// Path and query with the mount prefix removed.
    pub url: String,
    /// Lower-cased header names; repeated headers joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub socket: SocketInfo,
    /// `None` for bodiless methods and for bodies that failed to parse.
    pub body: Option<RequestBody>,
}

impl NodeRequest {
    /// Returns a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parses the `Cookie` header. Malformed pairs are skipped.
    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        self.header(header::COOKIE.as_str())
            .map(|raw| {
                Cookie::split_parse(raw.to_string())
                    .filter_map(Result::ok)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registers a stream event listener.
    ///
    /// The body is already buffered, so `"end"` fires immediately and every
    /// other event never fires.
    pub fn on<F: FnOnce()>(&self, event: &str, callback: F) -> &Self {
        if event == "end" {
            callback();
        }
        self
    }
}

/// Builds [`NodeRequest`]s from fetch-style requests.
#[derive(Debug, Clone)]
pub struct RequestBridge {
    mount_path: String,
    forwarded_for_header: String,
    fallback_remote_address: String,
    max_body_bytes: usize,
}

impl Default for RequestBridge {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default(), &BridgeConfig::default())
    }
}

impl RequestBridge {
    /// Creates a bridge that strips `mount_path` from request paths.
    #[must_use]
    pub fn new(mount_path: impl Into<String>) -> Self {
        Self {
            mount_path: mount_path.into(),
            ..Self::default()
        }
    }

    /// Creates a bridge from configuration.
    #[must_use]
    pub fn from_config(provider: &ProviderConfig, bridge: &BridgeConfig) -> Self {
        Self {
            mount_path: provider.mount_path.clone(),
            forwarded_for_header: bridge.forwarded_for_header.to_ascii_lowercase(),
            fallback_remote_address: bridge.fallback_remote_address.clone(),
            max_body_bytes: bridge.max_body_bytes,
        }
    }

    /// Converts a buffered request.
    #[must_use]
    pub fn convert(&self, request: Request<Bytes>) -> NodeRequest {
        let (parts, body) = request.into_parts();
        let headers = flatten_headers(&parts.headers);
        let remote_address = self.remote_address(&headers);
        let url = self.strip_mount(parts.uri.path(), parts.uri.query());

        let body = if BODY_METHODS.contains(&parts.method) {
            parse_body(headers.get(header::CONTENT_TYPE.as_str()), &body)
        } else {
            None
        };

        NodeRequest {
            method: parts.method,
            url,
            headers,
            socket: SocketInfo { remote_address },
            body,
        }
    }

    /// Replaces the body size limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Buffers an axum request body, then converts the request.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::PayloadTooLarge`] if the body exceeds the
    /// configured limit and [`BridgeError::Body`] if it cannot be read.
    pub async fn convert_axum(
        &self,
        request: axum::extract::Request,
    ) -> Result<NodeRequest, BridgeError> {
        let (parts, body) = request.into_parts();
        let bytes = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!(limit = self.max_body_bytes, "Request body exceeds limit");
                return Err(BridgeError::PayloadTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            Err(e) => return Err(BridgeError::Body(e.to_string())),
        };
        Ok(self.convert(Request::from_parts(parts, bytes)))
    }

    fn strip_mount(&self, path: &str, query: Option<&str>) -> String {
        let mount = self.mount_path.trim_end_matches('/');
        let stripped = match path.strip_prefix(mount) {
            Some(rest) if !mount.is_empty() && (rest.is_empty() || rest.starts_with('/')) => rest,
            _ => path,
        };
        let stripped = if stripped.is_empty() { "/" } else { stripped };

        match query {
            Some(query) => format!("{stripped}?{query}"),
            None => stripped.to_string(),
        }
    }

    fn remote_address(&self, headers: &BTreeMap<String, String>) -> String {
        headers
            .get(&self.forwarded_for_header)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .unwrap_or(&self.fallback_remote_address)
            .to_string()
    }
}

/// Repeated `cookie` headers (HTTP/2 splits them) are joined with `"; "` so
/// they still parse as one cookie list; every other header uses `", "`.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for name in headers.keys() {
        let separator = if *name == header::COOKIE { "; " } else { ", " };
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(separator);
        flat.insert(name.as_str().to_string(), joined);
    }
    flat
}

fn parse_body(content_type: Option<&String>, body: &Bytes) -> Option<RequestBody> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if essence == "application/x-www-form-urlencoded" {
        let form = form_urlencoded::parse(body).into_owned().collect();
        return Some(RequestBody::Form(form));
    }

    if essence == "application/json" || essence.ends_with("+json") {
        return match serde_json::from_slice(body) {
            Ok(value) => Some(RequestBody::Json(value)),
            Err(e) => {
                warn!(error = %e, content_type = %essence, "Failed to parse JSON request body");
                None
            }
        };
    }

    match std::str::from_utf8(body) {
        Ok(text) => Some(RequestBody::Text(text.to_string())),
        Err(e) => {
            warn!(error = %e, content_type = %essence, "Request body is not valid UTF-8");
            None
        }
    }
}
