use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;

use crate::error::{AppError, ServiceError};
use crate::middleware::session::{self, CurrentUser, MaybeUser};
use crate::models::user::{SignUp, User};
use crate::models::UserId;
use crate::services::Store;

use super::{page_context, render, AppState};

const USERS_PER_PAGE: i64 = 30;

#[derive(Deserialize, Debug, Default)]
struct Page {
    after: Option<UserId>,
}

async fn get_users<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<Page>,
) -> Result<Html<String>, AppError> {
    let users = state
        .store
        .get_users(page.after.unwrap_or(0), USERS_PER_PAGE)
        .await?;

    let mut ctx = page_context("All users", Some(&me));
    ctx.insert(
        "next_page",
        &users
            .last()
            .filter(|_| users.len() as i64 == USERS_PER_PAGE)
            .map(|u| u.id),
    );
    ctx.insert("users", &users);
    render(&state.tera, "users/index.html", &ctx)
}

async fn new_user<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Html<String>, AppError> {
    let mut ctx = page_context("Sign up", None);
    ctx.insert("name", "");
    ctx.insert("email", "");
    render(&state.tera, "users/new.html", &ctx)
}

#[tracing::instrument(skip_all)]
async fn create_user<S: Store>(
    State(state): State<AppState<S>>,
    jar: SignedCookieJar,
    Form(payload): Form<SignUp>,
) -> Result<Response, AppError> {
    match state.store.sign_up(&payload).await {
        Ok(user) => {
            let jar = session::sign_in(jar, &user);
            Ok((jar, Redirect::to(&format!("/users/{}", user.id))).into_response())
        }
        Err(ServiceError::Validation(errors)) => {
            tracing::info!(%errors, "sign up rejected");
            let mut ctx = page_context("Sign up", None);
            ctx.insert("errors", &errors);
            ctx.insert("name", &payload.name);
            ctx.insert("email", &payload.email);
            let page = render(&state.tera, "users/new.html", &ctx)?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn find_or_404<S: Store>(store: &S, id: UserId) -> Result<User, AppError> {
    Ok(store
        .find_user(id)
        .await?
        .ok_or(ServiceError::UnknownUser(id))?)
}

async fn show_user<S: Store>(
    State(state): State<AppState<S>>,
    MaybeUser(me): MaybeUser,
    Path(id): Path<UserId>,
) -> Result<Html<String>, AppError> {
    let user = find_or_404(&state.store, id).await?;

    let is_following = match &me {
        Some(me) if me.id != user.id => state.store.is_following(me.id, user.id).await?,
        _ => false,
    };

    let mut ctx = page_context(&user.name, me.as_ref());
    ctx.insert("user", &user);
    ctx.insert("microposts", &state.store.microposts_by(user.id).await?);
    ctx.insert(
        "following_count",
        &state.store.followed_ids(user.id).await?.len(),
    );
    ctx.insert(
        "followers_count",
        &state.store.follower_ids(user.id).await?.len(),
    );
    ctx.insert("is_self", &me.as_ref().is_some_and(|m| m.id == user.id));
    ctx.insert("is_following", &is_following);
    render(&state.tera, "users/show.html", &ctx)
}

#[tracing::instrument(skip_all)]
async fn destroy_user<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    jar: SignedCookieJar,
    Path(id): Path<UserId>,
) -> Result<Response, AppError> {
    if me.id != id {
        tracing::warn!(by = me.id, "refusing to destroy another user's account");
        return Ok(Redirect::to("/").into_response());
    }
    state.store.delete_user(id).await?;
    Ok((session::sign_out(jar), Redirect::to("/")).into_response())
}

async fn show_follow<S: Store>(
    state: &AppState<S>,
    me: &User,
    id: UserId,
    title: &str,
    ids: impl IntoIterator<Item = UserId>,
) -> Result<Html<String>, AppError> {
    let user = find_or_404(&state.store, id).await?;
    let ids: Vec<UserId> = ids.into_iter().collect();
    let users = state.store.find_users(&ids).await?;

    let mut ctx = page_context(title, Some(me));
    ctx.insert("user", &user);
    ctx.insert("users", &users);
    render(&state.tera, "users/show_follow.html", &ctx)
}

async fn following<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Html<String>, AppError> {
    let ids = state.store.followed_ids(id).await?;
    show_follow(&state, &me, id, "Following", ids).await
}

async fn followers<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Html<String>, AppError> {
    let ids = state.store.follower_ids(id).await?;
    show_follow(&state, &me, id, "Followers", ids).await
}

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/signup", get(new_user::<S>))
        .route("/users", get(get_users::<S>).post(create_user::<S>))
        .route("/users/:id", get(show_user::<S>))
        .route("/users/:id/destroy", post(destroy_user::<S>))
        .route("/users/:id/following", get(following::<S>))
        .route("/users/:id/followers", get(followers::<S>))
}
