pub mod feed;
pub mod microposts;
pub mod pages;
pub mod relationships;
pub mod sessions;
pub mod users;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::header;
use axum::response::Html;
use axum::Router;
use axum_extra::extract::cookie::Key;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Tera};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::error::AppError;
use crate::middleware::logging::HttpLoggingExt;
use crate::models::post::Micropost;
use crate::models::user::User;
use crate::models::{MicropostId, UserId, ValidationErrors};
use crate::services::Store;

#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub tera: Arc<Tera>,
    pub key: Key,
}

impl<S> FromRef<AppState<S>> for Key {
    fn from_ref(state: &AppState<S>) -> Self {
        state.key.clone()
    }
}

pub fn app<S: Store>(state: AppState<S>, assets_dir: &str) -> Router {
    Router::new()
        .merge(pages::router::<S>())
        .merge(users::router::<S>())
        .merge(sessions::router::<S>())
        .merge(microposts::router::<S>())
        .merge(relationships::router::<S>())
        .merge(feed::router::<S>())
        .with_state(state)
        .nest_service(
            "/assets",
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    header::HeaderValue::from_static("max-age=13420"),
                ))
                .layer(CompressionLayer::new())
                .service(ServeDir::new(assets_dir)),
        )
        .with_http_logging()
}

pub fn render(tera: &Tera, template: &str, ctx: &Context) -> Result<Html<String>, AppError> {
    Ok(Html(tera.render(template, ctx)?))
}

/// Context every page starts from; the layout reads `title` and `current_user`.
pub fn page_context(title: &str, current_user: Option<&User>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("title", title);
    ctx.insert("current_user", &current_user);
    ctx.insert("errors", &ValidationErrors::default());
    ctx
}

#[derive(Serialize, Debug)]
pub struct FeedItem {
    pub id: MicropostId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub author: String,
}

/// Pairs each micropost with its author's name for rendering.
pub async fn with_authors<S: Store>(
    store: &S,
    posts: Vec<Micropost>,
) -> Result<Vec<FeedItem>, AppError> {
    let mut ids: Vec<UserId> = posts.iter().map(|p| p.user_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let names: HashMap<UserId, String> = store
        .find_users(&ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();

    Ok(posts
        .into_iter()
        .map(|p| FeedItem {
            author: names.get(&p.user_id).cloned().unwrap_or_default(),
            id: p.id,
            content: p.content,
            created_at: p.created_at,
            user_id: p.user_id,
        })
        .collect())
}
