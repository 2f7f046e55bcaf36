use std::io::Write;

use {
    anyhow::Result,
    clap::Subcommand,
    plusgate_oauth::{AuthorizationChannel, ClientFactory, Clock, CredentialStore, SystemClock},
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Run the authorization flow now and store the tokens.
    Login,
    /// Show the stored credentials.
    Status,
    /// Forget the stored credentials.
    Logout,
}

pub async fn handle_auth(
    action: AuthAction,
    factory: &ClientFactory,
    channel: &dyn AuthorizationChannel,
    identity: &str,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        AuthAction::Login => login(factory, channel, identity, out).await,
        AuthAction::Status => status(factory.store().as_ref(), SystemClock.now(), out).await,
        AuthAction::Logout => logout(factory.store().as_ref(), identity, out).await,
    }
}

async fn login(
    factory: &ClientFactory,
    channel: &dyn AuthorizationChannel,
    identity: &str,
    out: &mut impl Write,
) -> Result<()> {
    let exchange = factory.exchange()?;
    if exchange.store().load(identity).await?.is_some() {
        writeln!(out, "Already logged in as {identity}; run `auth logout` first to start over")?;
        return Ok(());
    }
    exchange.obtain(identity, channel).await?;
    writeln!(out, "Successfully logged in as {identity}")?;
    Ok(())
}

fn describe_expiry(expires_at: Option<u64>, now: u64) -> String {
    match expires_at {
        None => "expiry unknown".to_string(),
        Some(ts) if ts > now => {
            let remaining = ts - now;
            let hours = remaining / 3600;
            let mins = (remaining % 3600) / 60;
            format!("valid ({hours}h {mins}m remaining)")
        },
        Some(_) => "expired (will refresh on next use)".to_string(),
    }
}

async fn status(store: &dyn CredentialStore, now: u64, out: &mut impl Write) -> Result<()> {
    let identities = store.list().await?;
    if identities.is_empty() {
        writeln!(out, "No stored credentials.")?;
        return Ok(());
    }
    for identity in identities {
        if let Some(tokens) = store.load(&identity).await? {
            let refresh = if tokens.refresh_token.is_empty() {
                ", no refresh token"
            } else {
                ""
            };
            writeln!(
                out,
                "{identity} [{}{refresh}]",
                describe_expiry(tokens.expires_at, now)
            )?;
        }
    }
    Ok(())
}

async fn logout(store: &dyn CredentialStore, identity: &str, out: &mut impl Write) -> Result<()> {
    store.delete(identity).await?;
    writeln!(out, "Logged out {identity}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        plusgate_oauth::{FileCredentialStore, TokenPair},
    };

    #[test]
    fn expiry_descriptions() {
        assert_eq!(describe_expiry(None, 100), "expiry unknown");
        assert_eq!(
            describe_expiry(Some(100 + 2 * 3600 + 5 * 60), 100),
            "valid (2h 5m remaining)"
        );
        assert!(describe_expiry(Some(50), 100).starts_with("expired"));
    }

    #[tokio::test]
    async fn status_and_logout_use_the_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("tokens.json"));

        let mut out = Vec::new();
        status(&store, 1_000, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No stored credentials.\n");

        store
            .save("local", &TokenPair::new("a", "r").with_expiry(1_000 + 3_600))
            .await
            .unwrap();
        let mut out = Vec::new();
        status(&store, 1_000, &mut out).await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "local [valid (1h 0m remaining)]\n"
        );

        let mut out = Vec::new();
        logout(&store, "local", &mut out).await.unwrap();
        assert!(store.load("local").await.unwrap().is_none());
        assert_eq!(String::from_utf8(out).unwrap(), "Logged out local\n");
    }
}
