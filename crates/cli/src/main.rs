mod actions;
mod auth_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    clap::{Parser, Subcommand},
    plusgate_config::PlusgateConfig,
    plusgate_oauth::{
        ClientFactory, CredentialStore, FileCredentialStore, MemoryCredentialStore, PromptChannel,
        resolve_cipher,
    },
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::actions::{Action, ActionContext};

/// The CLI keeps a single credential record under this identity.
const LOCAL_IDENTITY: &str = "local";

#[derive(Parser)]
#[command(name = "plusgate", about = "plusgate: Google+ API demos with key and OAuth access")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file. Searched for in ./ and ~/.config/plusgate/ when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File where OAuth tokens are read and written. Tokens are kept in
    /// memory only when neither this nor `storage.token_path` is set.
    #[arg(long, global = true)]
    token_path: Option<PathBuf>,

    /// The action(s) to execute: all, activities.get, people.search, plus.me.
    #[arg(long, default_value = "all")]
    action: String,

    /// ID of a *public* activity for activities.get.
    #[arg(long)]
    activity_id: Option<String>,

    /// Search text for people.search.
    #[arg(long, default_value = "Vic")]
    query: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web front end.
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Manage the stored OAuth credentials.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // Logs go to stderr so action output on stdout stays clean.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PlusgateConfig> {
    match path {
        Some(path) => plusgate_config::load_config(path),
        None => plusgate_config::discover_and_load(),
    }
}

fn open_store(
    config: &PlusgateConfig,
    token_path: Option<PathBuf>,
) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let path = token_path.or_else(|| config.storage.token_path.as_ref().map(PathBuf::from));
    let cipher = resolve_cipher(&config.storage)?;
    match path {
        Some(path) => {
            info!(path = %path.display(), encrypted = cipher.is_some(), "using token file");
            let store = FileCredentialStore::new(path);
            Ok(Arc::new(match cipher {
                Some(cipher) => store.with_cipher(cipher),
                None => store,
            }))
        },
        None => {
            if cipher.is_some() {
                warn!("storage.encryption_key is set but there is no token file to encrypt");
            }
            Ok(Arc::new(MemoryCredentialStore::new()))
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "plusgate starting");

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Gateway { bind, port }) => {
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            plusgate_gateway::start_gateway(Arc::new(config)).await
        },
        Some(Commands::Auth { action }) => {
            let store = open_store(&config, cli.token_path)?;
            let factory = ClientFactory::new(Arc::new(config), store);
            auth_commands::handle_auth(
                action,
                &factory,
                &PromptChannel::stdio(),
                LOCAL_IDENTITY,
                &mut std::io::stdout(),
            )
            .await
        },
        None => {
            let selected = Action::select(&cli.action)?;
            let activity_id = cli
                .activity_id
                .unwrap_or_else(|| config.api.activity_id.clone());
            let store = open_store(&config, cli.token_path)?;
            let factory = ClientFactory::new(Arc::new(config), store);
            let channel = PromptChannel::stdio();

            let ctx = ActionContext {
                factory: &factory,
                channel: &channel,
                identity: LOCAL_IDENTITY,
                activity_id: &activity_id,
                query: &cli.query,
            };
            let mut stdout = std::io::stdout();
            for action in selected {
                ctx.run(action, &mut stdout).await?;
            }
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from([
            "plusgate",
            "--config",
            "plusgate.toml",
            "--token-path",
            "/tmp/tokens.json",
            "--action",
            "plus.me",
        ]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("plusgate.toml")));
        assert_eq!(cli.token_path.as_deref(), Some(Path::new("/tmp/tokens.json")));
        assert_eq!(cli.action, "plus.me");
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["plusgate", "auth", "status", "--token-path", "t.json"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Auth {
                action: auth_commands::AuthAction::Status
            })
        ));
        assert_eq!(cli.action, "all");
    }

    #[test]
    fn store_falls_back_to_memory() {
        let config = PlusgateConfig::default();
        // No path anywhere: the oauth actions still run, nothing is written.
        assert!(open_store(&config, None).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&config, Some(dir.path().join("tokens.json"))).unwrap();
        drop(store);
        assert!(!dir.path().join("tokens.json").exists());
    }
}
