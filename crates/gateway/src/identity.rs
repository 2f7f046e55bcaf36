//! Who is signed in. Development stand-in for a hosting platform's user
//! service: `/login?user=<name>` sets a signed cookie naming the identity
//! under which OAuth credentials are stored.

use {
    axum::{extract::Query, response::Response},
    axum_extra::extract::{
        SignedCookieJar,
        cookie::{Cookie, SameSite},
    },
    serde::Deserialize,
    tracing::info,
};

use crate::error::{GatewayError, found};

pub const IDENTITY_COOKIE: &str = "plusgate_user";

/// The signed-in user, inserted into request extensions by `require_user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity(pub String);

impl UserIdentity {
    pub fn from_jar(jar: &SignedCookieJar) -> Option<Self> {
        jar.get(IDENTITY_COOKIE)
            .map(|c| c.value().trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self)
    }
}

/// `candidate` when it is a path on this site, otherwise `/`. Keeps the
/// `continue` and `state` parameters from redirecting off-site.
pub fn local_path(candidate: Option<&str>) -> &str {
    match candidate {
        Some(p) if p.starts_with('/') && !p.starts_with("//") && !p.starts_with("/\\") => p,
        _ => "/",
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    user: Option<String>,
    #[serde(rename = "continue")]
    continue_to: Option<String>,
}

pub async fn login_handler(
    jar: SignedCookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<(SignedCookieJar, Response), GatewayError> {
    let user = query
        .user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("missing user parameter".into()))?
        .to_string();

    info!(user = %user, "signed in");
    let cookie = Cookie::build((IDENTITY_COOKIE, user))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    let target = local_path(query.continue_to.as_deref()).to_string();
    Ok((jar.add(cookie), found(&target)))
}

pub async fn logout_handler(jar: SignedCookieJar) -> (SignedCookieJar, Response) {
    (
        jar.remove(Cookie::build(IDENTITY_COOKIE).path("/")),
        found("/"),
    )
}
