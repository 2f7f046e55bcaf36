//! Configuration loading for plusgate.
//!
//! The config file is read once at process start and passed by reference into
//! every component that needs it.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        ApiSettings, Environment, GatewaySettings, OAuthSettings, PlusgateConfig, StorageSettings,
    },
};
