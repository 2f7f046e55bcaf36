//! Request stages run before the demo handlers. Each may answer the request
//! itself or forward it with something added to its extensions:
//!
//! - [`require_user`] → [`UserIdentity`], or a redirect to the login page;
//! - [`with_no_auth_client`] → a key-signed `SigningClient`;
//! - [`with_oauth_client`] → a bearer `SigningClient` for the user, or a
//!   redirect to the provider when none is stored yet or the stored refresh
//!   token was rejected. The redirect's `state` is bound to this browser by a
//!   signed nonce cookie that the callback checks.
//!
//! They are registered in order with `tower::ServiceBuilder` in `server.rs`.

use {
    axum::{
        extract::{Request, State},
        middleware::Next,
        response::{IntoResponse, Response},
    },
    axum_extra::extract::{
        SignedCookieJar,
        cookie::{Cookie, SameSite},
    },
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    plusgate_oauth::{Error, RedirectChannel},
    rand::RngCore,
    tracing::{debug, info},
    url::form_urlencoded,
};

use crate::{
    error::{GatewayError, ReauthorizationNeeded, found},
    identity::UserIdentity,
    state::AppState,
};

fn path_and_query(req: &Request) -> String {
    req.uri()
        .path_and_query()
        .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string())
}

pub async fn require_user(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(identity) = UserIdentity::from_jar(&jar) else {
        let back = path_and_query(&req);
        debug!(path = %back, "no signed-in user; redirecting to login");
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("continue", &back)
            .finish();
        return found(&format!("{}?{query}", state.config.gateway.login_path));
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

pub async fn with_no_auth_client(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let client = state.factory.no_auth()?;
    req.extensions_mut().insert(client);
    Ok(next.run(req).await)
}

pub async fn with_oauth_client(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let identity = req
        .extensions()
        .get::<UserIdentity>()
        .cloned()
        .ok_or(GatewayError::MissingIdentity)?;

    // Without stored credentials this ends in a redirect to the provider,
    // which sends the user back here through `state`.
    let nonce = new_nonce();
    let oauth_state = join_state(&nonce, &path_and_query(&req));
    let channel = RedirectChannel::new(oauth_state.clone());
    let client = match state.factory.oauth(&identity.0, &channel).await {
        Ok(client) => client,
        Err(Error::AuthorizationPending { url }) => return Ok(to_provider(jar, nonce, &url)),
        Err(Error::ReauthorizationRequired) => {
            return reauthorize(&state, jar, &identity, nonce, &oauth_state);
        },
        Err(err) => return Err(err.into()),
    };

    req.extensions_mut().insert(client);
    let resp = next.run(req).await;
    if resp.extensions().get::<ReauthorizationNeeded>().is_some() {
        return reauthorize(&state, jar, &identity, nonce, &oauth_state);
    }
    Ok(resp)
}

/// Send the user through the consent screen again. The callback overwrites
/// the stale record.
fn reauthorize(
    state: &AppState,
    jar: SignedCookieJar,
    identity: &UserIdentity,
    nonce: String,
    oauth_state: &str,
) -> Result<Response, GatewayError> {
    let url = state.factory.exchange()?.flow().authorization_url(oauth_state);
    info!(user = %identity.0, "stored refresh token rejected; restarting authorization");
    Ok(to_provider(jar, nonce, url.as_str()))
}

// ── Authorization state ──────────────────────────────────────────────────────

/// Signed cookie holding the nonce of the authorization this browser started.
pub const OAUTH_STATE_COOKIE: &str = "plusgate_oauth_state";

fn new_nonce() -> String {
    let mut bytes = [0u8; 18];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `state` sent to the provider: `<nonce>.<return path>`.
fn join_state(nonce: &str, back: &str) -> String {
    format!("{nonce}.{back}")
}

/// The return path carried by `state`, if its nonce matches the one this
/// browser was given.
pub fn verify_state<'a>(jar: &SignedCookieJar, state: Option<&'a str>) -> Option<&'a str> {
    let (nonce, back) = state?.split_once('.')?;
    let expected = jar.get(OAUTH_STATE_COOKIE)?;
    (!nonce.is_empty() && expected.value() == nonce).then_some(back)
}

fn to_provider(jar: SignedCookieJar, nonce: String, url: &str) -> Response {
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, nonce))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), found(url)).into_response()
}
