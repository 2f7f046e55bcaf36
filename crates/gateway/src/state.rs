use std::sync::Arc;

use {
    anyhow::Context,
    axum::extract::FromRef,
    axum_extra::extract::cookie::Key,
    base64::{Engine, engine::general_purpose::STANDARD},
    plusgate_config::PlusgateConfig,
    plusgate_oauth::{ClientFactory, CredentialStore},
    secrecy::ExposeSecret,
    tracing::warn,
};

// ── Shared app state ─────────────────────────────────────────────────────────

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PlusgateConfig>,
    pub factory: Arc<ClientFactory>,
    cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl AppState {
    /// The factory redirects OAuth users back to
    /// [`PlusgateConfig::web_redirect_uri`]. When no root URL is configured
    /// the OAuth routes fail per request and the no-auth routes still work.
    pub fn new(config: Arc<PlusgateConfig>, store: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        let redirect_uri = config.web_redirect_uri().unwrap_or_else(|e| {
            warn!(error = %e, "oauth redirect URI unavailable; oauth routes are disabled");
            String::new()
        });
        let factory = ClientFactory::new(config.clone(), store).with_redirect_uri(redirect_uri);
        let cookie_key = cookie_key(&config)?;

        Ok(Self {
            config,
            factory: Arc::new(factory),
            cookie_key,
        })
    }
}

fn cookie_key(config: &PlusgateConfig) -> anyhow::Result<Key> {
    match &config.gateway.cookie_key {
        Some(encoded) => {
            let bytes = STANDARD
                .decode(encoded.expose_secret().trim())
                .context("gateway.cookie_key is not valid base64")?;
            Key::try_from(bytes.as_slice())
                .map_err(|_| anyhow::anyhow!("gateway.cookie_key must be at least 64 bytes"))
        },
        None => {
            warn!("gateway.cookie_key not set; sign-ins will not survive a restart");
            Key::try_generate().context("failed to generate a cookie key")
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, plusgate_oauth::MemoryCredentialStore, secrecy::Secret};

    #[test]
    fn short_cookie_key_is_rejected() {
        let mut config = PlusgateConfig::default();
        config.gateway.cookie_key = Some(Secret::new(STANDARD.encode([1u8; 16])));
        let err = AppState::new(Arc::new(config), Arc::new(MemoryCredentialStore::new()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("64 bytes"));
    }

    #[test]
    fn configured_cookie_key_is_used() {
        let mut config = PlusgateConfig::default();
        config.gateway.cookie_key = Some(Secret::new(STANDARD.encode([3u8; 64])));
        let state =
            AppState::new(Arc::new(config), Arc::new(MemoryCredentialStore::new())).unwrap();
        assert_eq!(Key::from_ref(&state).master(), Key::from(&[3u8; 64]).master());
    }
}
