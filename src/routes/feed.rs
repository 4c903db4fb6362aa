use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppError;
use crate::middleware::session::CurrentUser;
use crate::models::post::Micropost;
use crate::services::Store;

use super::AppState;

async fn get_feed<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<Vec<Micropost>>, AppError> {
    Ok(Json(state.store.feed(me.id).await?))
}

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/feed.json", get(get_feed::<S>))
}
