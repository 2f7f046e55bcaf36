use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::PlusgateConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "plusgate.toml",
    "plusgate.yaml",
    "plusgate.yml",
    "plusgate.json",
];

/// Environment variables that override individual secrets after file load.
pub const ENV_API_KEY: &str = "PLUSGATE_API_KEY";
pub const ENV_CLIENT_ID: &str = "PLUSGATE_OAUTH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "PLUSGATE_OAUTH_CLIENT_SECRET";

/// Load config from the given path (any supported format), then apply
/// environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<PlusgateConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./plusgate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/plusgate/plusgate.{toml,yaml,yml,json}` (user-global)
///
/// Returns the defaults (plus environment overrides) if no file is found.
/// A file that exists but fails to load is an error.
pub fn discover_and_load() -> anyhow::Result<PlusgateConfig> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(dir) = config_dir() {
        dirs.push(dir);
    }

    match find_config_file(&dirs) {
        Some(path) => load_config(&path),
        None => {
            warn!("no plusgate config file found, using defaults");
            let mut config = PlusgateConfig::default();
            apply_env_overrides(&mut config, |name| std::env::var(name).ok());
            Ok(config)
        },
    }
}

/// Find the first config file in `dirs`, checking every file name in a
/// directory before moving to the next one.
pub fn find_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user-global config directory: `~/.config/plusgate/`.
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("plusgate"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Override secrets from `lookup` (normally the process environment).
/// Empty values are ignored.
pub fn apply_env_overrides(config: &mut PlusgateConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get(ENV_API_KEY) {
        config.api_key = Some(Secret::new(v));
    }
    if let Some(v) = get(ENV_CLIENT_ID) {
        config.oauth.client_id = Some(v);
    }
    if let Some(v) = get(ENV_CLIENT_SECRET) {
        config.oauth.client_secret = Some(Secret::new(v));
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<PlusgateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
