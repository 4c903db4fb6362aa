//! Signed-cookie sessions. The cookie carries the user id only; the user record is
//! loaded again on every request.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};

use crate::error::AppError;
use crate::models::user::User;
use crate::models::UserId;
use crate::routes::AppState;
use crate::services::Store;

pub const SESSION_COOKIE: &str = "user_id";

/// The signed-in user. Rejects with a redirect to the sign-in page.
pub struct CurrentUser(pub User);

pub fn session_user_id(jar: &SignedCookieJar) -> Option<UserId> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse().ok())
}

pub fn sign_in(jar: SignedCookieJar, user: &User) -> SignedCookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, user.id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

pub fn sign_out(jar: SignedCookieJar) -> SignedCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// The signed-in user when there is one. A missing or stale session is `None`;
/// only a failing store lookup rejects.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for MaybeUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_headers(&parts.headers, state.key.clone());
        let Some(id) = session_user_id(&jar) else {
            return Ok(MaybeUser(None));
        };

        // `None` here is an account destroyed while the cookie was still around
        state
            .store
            .find_user(id)
            .await
            .map(MaybeUser)
            .map_err(|e| AppError::from(e).into_response())
    }
}

#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.map(CurrentUser)
            .ok_or_else(|| Redirect::to("/signin").into_response())
    }
}
