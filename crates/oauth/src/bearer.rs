//! User-authorized access: bearer token with one-shot refresh-and-retry.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    reqwest::{
        Request, Response, StatusCode,
        header::{AUTHORIZATION, HeaderValue},
    },
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

use crate::{
    clock::{Clock, SystemClock},
    error::{Error, Result},
    flow::OAuthFlow,
    storage::CredentialStore,
    transport::{HttpTransport, default_transport},
    types::TokenPair,
};

/// Refresh this many seconds before the recorded expiry.
pub const EXPIRY_LEEWAY_SECS: u64 = 60;

struct PersistTarget {
    store: Arc<dyn CredentialStore>,
    identity: String,
}

/// Transport that attaches `Authorization: Bearer <access token>`.
///
/// On a 401 it refreshes the token pair once and replays the request once;
/// the replayed response is returned whatever its status. A pair whose known
/// expiry has passed is refreshed before the first attempt instead, and that
/// counts as the call's only refresh.
///
/// A refreshed pair that cannot be written to the store is still used for
/// the retry and for later calls; [`BearerTransport::has_unsaved_tokens`]
/// reports it until a later refresh is saved.
pub struct BearerTransport {
    flow: Arc<OAuthFlow>,
    inner: Arc<dyn HttpTransport>,
    tokens: Mutex<TokenPair>,
    persist: Option<PersistTarget>,
    unsaved: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl BearerTransport {
    pub fn new(flow: Arc<OAuthFlow>, tokens: TokenPair) -> Self {
        Self::with_transport(flow, tokens, default_transport())
    }

    pub fn with_transport(
        flow: Arc<OAuthFlow>,
        tokens: TokenPair,
        inner: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            flow,
            inner,
            tokens: Mutex::new(tokens),
            persist: None,
            unsaved: AtomicBool::new(false),
            clock: Arc::new(SystemClock),
        }
    }

    /// Write refreshed pairs to `store` under `identity`.
    #[must_use]
    pub fn persist_to(
        mut self,
        store: Arc<dyn CredentialStore>,
        identity: impl Into<String>,
    ) -> Self {
        self.persist = Some(PersistTarget {
            store,
            identity: identity.into(),
        });
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Snapshot of the pair currently held.
    pub async fn tokens(&self) -> TokenPair {
        self.tokens.lock().await.clone()
    }

    /// True when the pair held in memory is newer than the stored one
    /// because writing a refreshed pair failed.
    pub fn has_unsaved_tokens(&self) -> bool {
        self.unsaved.load(Ordering::Acquire)
    }

    async fn refresh(&self, current: &TokenPair) -> Result<TokenPair> {
        let fresh = self.flow.refresh(current).await?;
        *self.tokens.lock().await = fresh.clone();

        if let Some(target) = &self.persist {
            match target.store.save(&target.identity, &fresh).await {
                Ok(()) => {
                    self.unsaved.store(false, Ordering::Release);
                    debug!(identity = %target.identity, "persisted refreshed tokens");
                },
                Err(source) => {
                    self.unsaved.store(true, Ordering::Release);
                    warn!(
                        identity = %target.identity,
                        error = %source,
                        "failed to persist refreshed tokens; continuing with the in-memory pair"
                    );
                },
            }
        }
        Ok(fresh)
    }
}

fn authorize(mut request: Request, tokens: &TokenPair) -> Result<Request> {
    let header = format!("{} {}", tokens.token_type, tokens.access_token);
    let mut value = HeaderValue::from_str(&header)
        .map_err(|_| Error::Request("access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

#[async_trait]
impl HttpTransport for BearerTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let replay = request
            .try_clone()
            .ok_or_else(|| Error::Request("request body cannot be replayed after refresh".into()))?;

        let mut current = self.tokens().await;
        let mut refreshed = false;
        if current.is_expired(self.clock.now(), EXPIRY_LEEWAY_SECS) {
            debug!("access token expired; refreshing before send");
            current = self.refresh(&current).await?;
            refreshed = true;
        }

        let resp = self.inner.send(authorize(request, &current)?).await?;
        if resp.status() != StatusCode::UNAUTHORIZED || refreshed {
            return Ok(resp);
        }

        debug!(path = %replay.url().path(), "access token rejected; refreshing and retrying once");
        let fresh = self.refresh(&current).await?;
        self.inner.send(authorize(replay, &fresh)?).await
    }
}
