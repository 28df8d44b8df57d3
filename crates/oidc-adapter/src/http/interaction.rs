//! Synthetic request/response pairs for server-side interaction lookups.
//!
//! Server-rendered pages need the engine's interaction details for a uid
//! without a live engine request. [`InteractionContextFactory`] builds a GET
//! to the canonical interaction path, carrying the caller's cookies and the
//! application's own host, and hands back a fresh collector to pass along
//! with it.

use axum::body::Bytes;
use axum::http::{Method, Request, header};
use axum_extra::extract::CookieJar;
use cookie::Cookie;
use url::Url;

use super::{
    BridgeError, NodeRequest, RedirectPolicy, RequestBridge, ResponseCollector,
    ResponseCompletion,
};
use crate::config::{AdapterConfig, ConfigError};

/// A synthetic request, a fresh collector and the URL they address.
#[derive(Debug)]
pub struct InteractionContext {
    pub url: Url,
    pub request: NodeRequest,
    pub response: ResponseCollector,
    pub completion: ResponseCompletion,
}

/// Builds [`InteractionContext`]s.
#[derive(Debug, Clone)]
pub struct InteractionContextFactory {
    base_url: Url,
    interaction_prefix: String,
    requests: RequestBridge,
    policy: RedirectPolicy,
}

impl InteractionContextFactory {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the public base URL is invalid
    /// or has no host.
    pub fn from_config(config: &AdapterConfig) -> Result<Self, ConfigError> {
        let base_url = config.public_base_url()?;
        if base_url.host_str().is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "public_base_url '{base_url}' has no host"
            )));
        }
        let interaction_prefix = format!(
            "{}{}",
            config.provider.mount_path.trim_end_matches('/'),
            config.provider.interaction_path.trim_end_matches('/'),
        );
        Ok(Self {
            base_url,
            interaction_prefix,
            requests: RequestBridge::from_config(&config.provider, &config.bridge),
            policy: config.bridge.redirect_policy,
        })
    }

    /// Canonical interaction URL for `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidRequest`] if the base URL cannot carry a
    /// path.
    pub fn interaction_url(&self, uid: &str) -> Result<Url, BridgeError> {
        let mut url = self.base_url.clone();
        url.set_path(&self.interaction_prefix);
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| {
                BridgeError::InvalidRequest(format!("'{}' cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .push(uid);
        Ok(url)
    }

    /// Value for the synthetic `Host` header.
    fn host(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Builds the context for `uid`, forwarding `cookies` as one `Cookie`
    /// header. Values are percent-encoded again, so cookies decoded by a
    /// [`CookieJar`] go out the way they came in.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidRequest`] if the request cannot be built,
    /// for example when a cookie contains characters not allowed in a header.
    pub fn for_uid<'a, 'c: 'a>(
        &self,
        uid: &str,
        cookies: impl IntoIterator<Item = &'a Cookie<'c>>,
    ) -> Result<InteractionContext, BridgeError> {
        let url = self.interaction_url(uid)?;
        let cookie_header = cookies
            .into_iter()
            .map(|c| c.stripped().encoded().to_string())
            .collect::<Vec<_>>()
            .join("; ");

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(header::HOST, self.host());
        if !cookie_header.is_empty() {
            builder = builder.header(header::COOKIE, cookie_header);
        }
        let request = builder
            .body(Bytes::new())
            .map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;

        let (response, completion) = ResponseCollector::new(self.policy);
        Ok(InteractionContext {
            url,
            request: self.requests.convert(request),
            response,
            completion,
        })
    }

    /// [`Self::for_uid`] with the cookies of an inbound axum request.
    ///
    /// # Errors
    ///
    /// See [`Self::for_uid`].
    pub fn for_jar(&self, uid: &str, jar: &CookieJar) -> Result<InteractionContext, BridgeError> {
        self.for_uid(uid, jar.iter())
    }
}
