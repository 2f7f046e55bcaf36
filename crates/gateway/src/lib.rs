//! Gateway: the web front end for the plusgate demos.
//!
//! Lifecycle:
//! 1. Load config, open the credential database
//! 2. Build the app state (client factory, cookie key)
//! 3. Register routes with their stages
//! 4. Serve
//!
//! Signing and credential handling live in `plusgate-oauth`; this crate only
//! supplies the server-side store, the identity cookie and the redirect
//! channel wiring.

pub mod error;
pub mod identity;
pub mod routes;
pub mod server;
pub mod stages;
pub mod state;
pub mod store;

pub use {
    server::{build_app, start_gateway},
    state::AppState,
    store::SqliteCredentialStore,
};
