use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::session;
use crate::models::ValidationErrors;
use crate::services::Store;

use super::{page_context, render, AppState};

#[derive(Deserialize)]
struct SignIn {
    email: String,
    password: String,
}

async fn new_session<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Html<String>, AppError> {
    let mut ctx = page_context("Sign in", None);
    ctx.insert("email", "");
    render(&state.tera, "sessions/new.html", &ctx)
}

#[tracing::instrument(skip_all)]
async fn create_session<S: Store>(
    State(state): State<AppState<S>>,
    jar: SignedCookieJar,
    Form(form): Form<SignIn>,
) -> Result<Response, AppError> {
    match state.store.authenticate(&form.email, &form.password).await? {
        Some(user) => {
            tracing::info!(user_id = user.id, "signed in");
            let jar = session::sign_in(jar, &user);
            Ok((jar, Redirect::to(&format!("/users/{}", user.id))).into_response())
        }
        None => {
            let mut ctx = page_context("Sign in", None);
            ctx.insert(
                "errors",
                &ValidationErrors::single("session", "Invalid email/password combination"),
            );
            ctx.insert("email", &form.email);
            let page = render(&state.tera, "sessions/new.html", &ctx)?;
            Ok((StatusCode::UNAUTHORIZED, page).into_response())
        }
    }
}

async fn destroy_session(jar: SignedCookieJar) -> impl IntoResponse {
    (session::sign_out(jar), Redirect::to("/"))
}

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/signin", get(new_session::<S>))
        .route("/sessions", post(create_session::<S>))
        .route("/signout", post(destroy_session))
}
