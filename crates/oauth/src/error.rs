use crate::types::TokenPair;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the signing and credential layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required static configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No credential record exists for the identity.
    #[error("no stored credentials for {identity}")]
    CredentialNotFound { identity: String },

    /// Network or protocol failure while talking to the token endpoint.
    #[error("credential exchange failed: {0}")]
    CredentialExchange(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The refresh token itself was rejected; the full exchange flow must run again.
    #[error("refresh token rejected, reauthorization required")]
    ReauthorizationRequired,

    /// The channel could not collect a code inline; the user must visit `url`.
    #[error("authorization pending at {url}")]
    AuthorizationPending { url: String },

    /// Tokens were obtained but could not be written back. `tokens` is still usable.
    #[error("tokens obtained but not persisted: {source}")]
    PersistFailed {
        tokens: Box<TokenPair>,
        #[source]
        source: StorageError,
    },

    /// The underlying HTTP transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request cannot be signed or replayed (e.g. a streaming body).
    #[error("invalid request: {0}")]
    Request(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn exchange(msg: impl Into<String>) -> Self {
        Self::CredentialExchange(msg.into())
    }
}

/// Credential storage failures. Distinct from "not found", which is `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("credential storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed credential record: {0}")]
    Malformed(String),

    #[error("credential decryption failed")]
    Crypto,

    #[error("credential backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
