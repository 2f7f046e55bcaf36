//! The signing client handed to callers, and the factory that builds it.

use std::sync::Arc;

use {
    plusgate_config::PlusgateConfig,
    reqwest::{Method, Request, Response},
    tracing::debug,
    url::Url,
};

use crate::{
    bearer::BearerTransport,
    channel::AuthorizationChannel,
    clock::{Clock, SystemClock},
    defaults::{resolve_api_key, resolve_oauth_config},
    error::{Error, Result},
    exchange::CredentialExchange,
    flow::OAuthFlow,
    keyed::KeyedTransport,
    storage::CredentialStore,
    transport::{HttpTransport, default_transport},
    types::{AuthMode, TokenPair},
};

/// A transport already configured to authenticate, plus the API base URL.
///
/// Cloning is cheap and clones share the same credentials.
#[derive(Clone)]
pub struct SigningClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    mode: AuthMode,
    bearer: Option<Arc<BearerTransport>>,
}

impl std::fmt::Debug for SigningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningClient")
            .field("base_url", &self.base_url.as_str())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl SigningClient {
    fn keyed(transport: KeyedTransport, base_url: Url) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url,
            mode: AuthMode::NoAuth,
            bearer: None,
        }
    }

    fn bearer(transport: BearerTransport, base_url: Url) -> Self {
        let bearer = Arc::new(transport);
        Self {
            transport: bearer.clone(),
            base_url,
            mode: AuthMode::OAuth,
            bearer: Some(bearer),
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Current token pair, for OAuth clients.
    pub async fn tokens(&self) -> Option<TokenPair> {
        match &self.bearer {
            Some(bearer) => Some(bearer.tokens().await),
            None => None,
        }
    }

    /// Whether a refreshed pair is held only in memory because saving it
    /// failed. Always false for API-key clients.
    pub fn has_unsaved_tokens(&self) -> bool {
        self.bearer
            .as_ref()
            .is_some_and(|bearer| bearer.has_unsaved_tokens())
    }

    /// Resolve `path` against the base URL. A leading `/` does not escape
    /// the base path.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Request(format!("invalid resource path {path}: {e}")))
    }

    pub async fn send(&self, request: Request) -> Result<Response> {
        self.transport.send(request).await
    }

    /// GET `path` (relative to the base URL) with `query` appended.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        self.send(Request::new(Method::GET, url)).await
    }
}

/// Builds [`SigningClient`]s from one loaded configuration.
pub struct ClientFactory {
    config: Arc<PlusgateConfig>,
    redirect_uri: String,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl ClientFactory {
    /// Uses `oauth.redirect_uri` from the config; the web app overrides it
    /// with [`with_redirect_uri`](Self::with_redirect_uri).
    pub fn new(config: Arc<PlusgateConfig>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            redirect_uri: config.oauth.redirect_uri.clone(),
            config,
            store,
            transport: default_transport(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    fn base_url(&self) -> Result<Url> {
        let raw = &self.config.api.base_url;
        let mut url = Url::parse(raw)
            .map_err(|e| Error::config(format!("api.base_url is invalid: {e}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// The exchange flow for the configured client registration.
    pub fn exchange(&self) -> Result<CredentialExchange> {
        let config = resolve_oauth_config(&self.config.oauth, &self.redirect_uri)?;
        let flow = OAuthFlow::new(Arc::new(config), self.transport.clone())
            .with_clock(self.clock.clone());
        Ok(CredentialExchange::new(Arc::new(flow), self.store.clone()))
    }

    /// Build a client for `mode`. OAuth mode needs `identity`; `channel` is
    /// only consulted when no credentials are stored for it.
    pub async fn build(
        &self,
        mode: AuthMode,
        identity: Option<&str>,
        channel: &dyn AuthorizationChannel,
    ) -> Result<SigningClient> {
        match mode {
            AuthMode::NoAuth => self.no_auth(),
            AuthMode::OAuth => {
                let identity =
                    identity.ok_or_else(|| Error::config("oauth mode requires an identity"))?;
                self.oauth(identity, channel).await
            },
        }
    }

    /// Simple API access signed with the configured API key.
    pub fn no_auth(&self) -> Result<SigningClient> {
        let api_key = resolve_api_key(&self.config)?;
        let base_url = self.base_url()?;
        debug!(base_url = %base_url, "building keyed client");
        Ok(SigningClient::keyed(
            KeyedTransport::with_transport(api_key, self.transport.clone()),
            base_url,
        ))
    }

    /// User-authorized access for `identity`. Refreshed tokens are written
    /// back to the store.
    pub async fn oauth(
        &self,
        identity: &str,
        channel: &dyn AuthorizationChannel,
    ) -> Result<SigningClient> {
        if identity.trim().is_empty() {
            return Err(Error::config("oauth identity is empty"));
        }
        let base_url = self.base_url()?;
        let exchange = self.exchange()?;

        let tokens = exchange.obtain(identity, channel).await?;
        debug!(identity, base_url = %base_url, "building bearer client");
        let transport =
            BearerTransport::with_transport(exchange.flow().clone(), tokens, self.transport.clone())
                .persist_to(self.store.clone(), identity)
                .with_clock(self.clock.clone());
        Ok(SigningClient::bearer(transport, base_url))
    }
}
