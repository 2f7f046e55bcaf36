use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::bail,
    axum::{Router, middleware::from_fn_with_state, routing::get},
    plusgate_config::PlusgateConfig,
    tower::ServiceBuilder,
    tower_http::trace::TraceLayer,
    tracing::info,
};

use crate::{
    identity::{login_handler, logout_handler},
    routes::{
        activities_get_handler, health_handler, index_handler, oauth_callback_handler,
        people_search_handler, plus_me_handler,
    },
    stages::{require_user, with_no_auth_client, with_oauth_client},
    state::AppState,
    store::SqliteCredentialStore,
};

const FIXED_ROUTES: &[&str] = &[
    "/",
    "/health",
    "/logout",
    "/activities_get",
    "/people_search",
    "/plus_me",
];

fn check_route(field: &str, path: &str) -> anyhow::Result<()> {
    if !path.starts_with('/') || path.len() < 2 {
        bail!("{field} must be an absolute path other than /, got {path:?}");
    }
    if path.contains(['{', '}', ':', '*', '?']) {
        bail!("{field} may not contain route parameters or a query, got {path:?}");
    }
    if FIXED_ROUTES.contains(&path) {
        bail!("{field} {path} collides with a built-in route");
    }
    Ok(())
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let callback_path = state.config.oauth.redirect_path.clone();
    let login_path = state.config.gateway.login_path.clone();
    check_route("oauth.redirect_path", &callback_path)?;
    check_route("gateway.login_path", &login_path)?;
    if callback_path == login_path {
        bail!("oauth.redirect_path and gateway.login_path are both {login_path}");
    }

    // Stages run top to bottom.
    let signed_in = ServiceBuilder::new().layer(from_fn_with_state(state.clone(), require_user));
    let no_auth = ServiceBuilder::new()
        .layer(from_fn_with_state(state.clone(), require_user))
        .layer(from_fn_with_state(state.clone(), with_no_auth_client));
    let oauth = ServiceBuilder::new()
        .layer(from_fn_with_state(state.clone(), require_user))
        .layer(from_fn_with_state(state.clone(), with_oauth_client));

    let pages = Router::new()
        .route("/", get(index_handler))
        .route(&callback_path, get(oauth_callback_handler))
        .route_layer(signed_in);
    let no_auth_demos = Router::new()
        .route("/activities_get", get(activities_get_handler))
        .route("/people_search", get(people_search_handler))
        .route_layer(no_auth);
    let oauth_demos = Router::new()
        .route("/plus_me", get(plus_me_handler))
        .route_layer(oauth);

    Ok(Router::new()
        .route("/health", get(health_handler))
        .route(&login_path, get(login_handler))
        .route("/logout", get(logout_handler))
        .merge(pages)
        .merge(no_auth_demos)
        .merge(oauth_demos)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Start the gateway HTTP server.
pub async fn start_gateway(config: Arc<PlusgateConfig>) -> anyhow::Result<()> {
    let store = SqliteCredentialStore::connect(&config.gateway.database_url).await?;
    let state = AppState::new(config.clone(), Arc::new(store))?;
    let app = build_app(state)?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("plusgate gateway v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on http://{addr}"),
        format!("environment: {:?}", config.gateway.environment),
        format!("oauth callback: {}", config.oauth.redirect_path),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app).await?;
    Ok(())
}
