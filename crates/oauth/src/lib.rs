//! Request signing and OAuth credential handling for the plusgate clients.
//!
//! Two ways to authenticate against the wrapped API:
//! - simple access, where [`KeyedTransport`] appends the API key to each URL;
//! - user-authorized access, where [`BearerTransport`] attaches a bearer token
//!   and refreshes it once on a 401.
//!
//! [`ClientFactory`] picks between them and hands back a [`SigningClient`].

pub mod bearer;
pub mod channel;
pub mod cipher;
pub mod client;
pub mod clock;
pub mod defaults;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod keyed;
pub mod storage;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use {
    bearer::BearerTransport,
    channel::{AuthorizationChannel, PromptChannel, RedirectChannel},
    cipher::TokenCipher,
    client::{ClientFactory, SigningClient},
    clock::{Clock, SystemClock},
    defaults::{resolve_api_key, resolve_cipher, resolve_oauth_config},
    error::{Error, Result, StorageError},
    exchange::CredentialExchange,
    flow::OAuthFlow,
    keyed::KeyedTransport,
    storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    transport::{HttpTransport, ReqwestTransport},
    types::{AuthMode, CredentialRecord, OAuthConfig, TokenPair},
};
