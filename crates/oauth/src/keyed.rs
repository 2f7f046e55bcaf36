//! Simple API access: append the API key to every request's query string.
//!
//! ```rust,ignore
//! let transport = KeyedTransport::new(api_key);
//! let client = SigningClient::new(Arc::new(transport), base_url);
//! let resp = client.get("people", &[("query", "Vic")]).await?;
//! ```

use std::sync::Arc;

use {
    async_trait::async_trait,
    reqwest::{Request, Response},
    secrecy::{ExposeSecret, Secret},
    tracing::trace,
};

use crate::{
    error::{Error, Result},
    transport::{HttpTransport, default_transport},
};

/// Query parameter the provider reads the API key from.
pub const KEY_PARAM: &str = "key";

/// Transport that signs requests with a static API key.
pub struct KeyedTransport {
    api_key: Secret<String>,
    inner: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for KeyedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedTransport")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl KeyedTransport {
    /// Sign with `api_key`, sending through the default transport.
    pub fn new(api_key: Secret<String>) -> Self {
        Self::with_transport(api_key, default_transport())
    }

    /// Sign with `api_key`, sending through `inner`. `inner` should not itself
    /// be a `KeyedTransport`, or the key is appended twice.
    pub fn with_transport(api_key: Secret<String>, inner: Arc<dyn HttpTransport>) -> Self {
        Self { api_key, inner }
    }

    /// Return a copy of `request` with `key=<api key>` appended after any
    /// existing parameters. A pre-existing `key` parameter is kept.
    pub fn sign(&self, request: &Request) -> Result<Request> {
        let key = self.api_key.expose_secret();
        if key.is_empty() {
            return Err(Error::config("no API key supplied"));
        }

        let mut signed = request
            .try_clone()
            .ok_or_else(|| Error::Request("request body cannot be copied for signing".into()))?;
        signed.url_mut().query_pairs_mut().append_pair(KEY_PARAM, key);
        Ok(signed)
    }
}

#[async_trait]
impl HttpTransport for KeyedTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let signed = self.sign(&request)?;
        trace!(method = %signed.method(), path = %signed.url().path(), "sending keyed request");
        self.inner.send(signed).await
    }
}
