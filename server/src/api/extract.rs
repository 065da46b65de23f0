use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::state::AppState;
use crate::auth::{Session, SessionManager};

/// Name of the cookie holding the signed session id
pub const SESSION_COOKIE: &str = "valhalla.session-token";

/// The caller's session, if the request carries a valid session cookie
///
/// Never rejects: handlers decide how to answer anonymous callers.
pub struct CurrentSession(pub Option<Session>);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(CurrentSession(session_from_jar(&jar, &state.sessions)))
    }
}

/// Resolve the session referenced by the jar's session cookie
pub fn session_from_jar(jar: &CookieJar, sessions: &SessionManager) -> Option<Session> {
    let cookie = jar.get(SESSION_COOKIE)?;
    let session_id = sessions.verify_cookie_value(cookie.value())?;

    match sessions.get_session(&session_id) {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(error = %err, "Failed to read session");
            None
        }
    }
}

/// Session cookie for a freshly signed session id
pub fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Cookie matching [`session_cookie`]'s scope, for removal
pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}
