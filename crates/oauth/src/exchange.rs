//! Initial credential acquisition: stored record, or an interactive
//! authorization-code exchange that is then persisted.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    channel::AuthorizationChannel,
    error::{Error, Result},
    flow::OAuthFlow,
    storage::CredentialStore,
    types::TokenPair,
};

/// Couples an [`OAuthFlow`] with the store its results are written to.
#[derive(Clone)]
pub struct CredentialExchange {
    flow: Arc<OAuthFlow>,
    store: Arc<dyn CredentialStore>,
}

impl CredentialExchange {
    pub fn new(flow: Arc<OAuthFlow>, store: Arc<dyn CredentialStore>) -> Self {
        Self { flow, store }
    }

    pub fn flow(&self) -> &Arc<OAuthFlow> {
        &self.flow
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Return the stored pair for `identity`, or run the authorization flow
    /// through `channel` and persist its result.
    ///
    /// A stored record is returned as-is; expiry is the bearer transport's
    /// concern.
    pub async fn obtain(
        &self,
        identity: &str,
        channel: &dyn AuthorizationChannel,
    ) -> Result<TokenPair> {
        if let Some(tokens) = self.store.load(identity).await? {
            debug!(identity, "using stored credentials");
            return Ok(tokens);
        }

        debug!(identity, "no stored credentials; starting authorization");
        let url = self.flow.authorization_url(&channel.state());
        let code = channel.authorize(&url).await?;
        self.complete(identity, &code).await
    }

    /// The stored pair for `identity`, without falling back to the flow.
    pub async fn stored(&self, identity: &str) -> Result<TokenPair> {
        self.store
            .load(identity)
            .await?
            .ok_or_else(|| Error::CredentialNotFound {
                identity: identity.to_string(),
            })
    }

    /// Exchange `code` and persist the resulting pair under `identity`.
    pub async fn complete(&self, identity: &str, code: &str) -> Result<TokenPair> {
        let tokens = self.flow.exchange(code).await?;

        if let Err(source) = self.store.save(identity, &tokens).await {
            warn!(identity, error = %source, "failed to persist new credentials");
            return Err(Error::PersistFailed {
                tokens: Box::new(tokens),
                source,
            });
        }
        info!(identity, "stored new credentials");
        Ok(tokens)
    }
}
