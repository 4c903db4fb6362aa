use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::middleware::session::MaybeUser;
use crate::models::user::User;
use crate::services::Store;

use super::{page_context, render, with_authors, AppState};

#[tracing::instrument(skip_all)]
async fn home<S: Store>(
    State(state): State<AppState<S>>,
    MaybeUser(current): MaybeUser,
) -> Result<Html<String>, AppError> {
    let Some(user) = current else {
        return render(&state.tera, "static_pages/home.html", &page_context("", None));
    };

    let mut ctx = page_context("", Some(&user));
    let feed = state.store.feed(user.id).await?;
    ctx.insert("feed_items", &with_authors(&state.store, feed).await?);
    ctx.insert(
        "micropost_count",
        &state.store.microposts_by(user.id).await?.len(),
    );
    render(&state.tera, "static_pages/home.html", &ctx)
}

fn static_page<S: Store>(
    state: &AppState<S>,
    template: &str,
    title: &str,
    current: Option<User>,
) -> Result<Html<String>, AppError> {
    let ctx = page_context(title, current.as_ref());
    render(&state.tera, template, &ctx)
}

async fn help<S: Store>(
    State(state): State<AppState<S>>,
    MaybeUser(current): MaybeUser,
) -> Result<Html<String>, AppError> {
    static_page(&state, "static_pages/help.html", "Help", current)
}

async fn about<S: Store>(
    State(state): State<AppState<S>>,
    MaybeUser(current): MaybeUser,
) -> Result<Html<String>, AppError> {
    static_page(&state, "static_pages/about.html", "About Us", current)
}

async fn contact<S: Store>(
    State(state): State<AppState<S>>,
    MaybeUser(current): MaybeUser,
) -> Result<Html<String>, AppError> {
    static_page(&state, "static_pages/contact.html", "Contact", current)
}

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(home::<S>))
        .route("/help", get(help::<S>))
        .route("/about", get(about::<S>))
        .route("/contact", get(contact::<S>))
}
