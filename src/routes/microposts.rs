use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::post;
use axum::{Form, Router};

use crate::error::{AppError, ServiceError};
use crate::middleware::session::CurrentUser;
use crate::models::post::CreatePost;
use crate::models::MicropostId;
use crate::services::Store;

use super::{page_context, render, AppState, FeedItem};

#[tracing::instrument(skip_all)]
async fn create_post<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    Form(f): Form<CreatePost>,
) -> Result<Response, AppError> {
    match state.store.create_micropost(me.id, &f.content).await {
        Ok(post) => {
            tracing::info!(post_id = post.id, "micropost created");
            Ok(Redirect::to("/").into_response())
        }
        // re-render home with the form errors and an empty feed
        Err(ServiceError::Validation(errors)) => {
            let mut ctx = page_context("", Some(&me));
            ctx.insert("errors", &errors);
            ctx.insert("feed_items", &Vec::<FeedItem>::new());
            ctx.insert(
                "micropost_count",
                &state.store.microposts_by(me.id).await?.len(),
            );
            let page = render(&state.tera, "static_pages/home.html", &ctx)?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[tracing::instrument(skip_all)]
async fn destroy_post<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<MicropostId>,
) -> Result<Redirect, AppError> {
    if !state.store.destroy_micropost(me.id, id).await? {
        tracing::warn!(post_id = id, user_id = me.id, "micropost missing or not owned");
    }
    Ok(Redirect::to("/"))
}

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/microposts", post(create_post::<S>))
        .route("/microposts/:id/destroy", post(destroy_post::<S>))
}
