use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::routing::post;
use axum::{Form, Router};

use crate::error::{AppError, ServiceError};
use crate::helpers::ert;
use crate::middleware::session::CurrentUser;
use crate::models::relationship::FollowForm;
use crate::models::UserId;
use crate::services::Store;

use super::AppState;

/// Follow failures never fail the request: the user lands back on a page either way.
#[tracing::instrument(skip_all)]
async fn create_relationship<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    Form(f): Form<FollowForm>,
) -> Result<Redirect, AppError> {
    let target = format!("/users/{}", f.followed_id);
    match state.store.follow(me.id, f.followed_id).await {
        Ok(()) => Ok(Redirect::to(&target)),
        Err(ServiceError::InvalidTarget(id)) => {
            tracing::warn!(followed_id = id, "follow target does not exist");
            Ok(Redirect::to("/"))
        }
        Err(ServiceError::SelfFollow) => Ok(Redirect::to(&target)),
        Err(e) => Err(AppError::from(e)).inspect_err(ert!()),
    }
}

#[tracing::instrument(skip_all)]
async fn destroy_relationship<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(me): CurrentUser,
    Path(followed_id): Path<UserId>,
) -> Result<Redirect, AppError> {
    state
        .store
        .unfollow(me.id, followed_id)
        .await
        .inspect_err(ert!())?;
    Ok(Redirect::to(&format!("/users/{followed_id}")))
}

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/relationships", post(create_relationship::<S>))
        .route(
            "/relationships/:followed_id/destroy",
            post(destroy_relationship::<S>),
        )
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use crate::services::{FollowGraph, UserService};

    #[tokio::test]
    async fn follow_and_unfollow_through_forms() {
        let (app, store) = test_app();
        let cookie = signed_up(&app, "alice").await;
        signed_up(&app, "bob").await;
        let alice = store.find_by_email("alice@example.com").await.unwrap().unwrap();
        let bob = store.find_by_email("bob@example.com").await.unwrap().unwrap();

        let body = format!("followed_id={}", bob.id);
        let res = send(&app, post_form("/relationships", &body, Some(&cookie))).await;
        assert_eq!(location(&res), format!("/users/{}", bob.id));
        assert!(store.is_following(alice.id, bob.id).await.unwrap());

        // second follow converges on the same state
        send(&app, post_form("/relationships", &body, Some(&cookie))).await;
        assert_eq!(store.follower_ids(bob.id).await.unwrap().len(), 1);

        let page = body_string(send(&app, get(&format!("/users/{}", bob.id), Some(&cookie))).await).await;
        assert!(page.contains("Unfollow"));

        let uri = format!("/relationships/{}/destroy", bob.id);
        let res = send(&app, post_form(&uri, "", Some(&cookie))).await;
        assert_eq!(location(&res), format!("/users/{}", bob.id));
        assert!(!store.is_following(alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn following_a_missing_user_redirects_home() {
        let (app, store) = test_app();
        let cookie = signed_up(&app, "alice").await;
        let alice = store.find_by_email("alice@example.com").await.unwrap().unwrap();

        let res = send(&app, post_form("/relationships", "followed_id=999", Some(&cookie))).await;
        assert_eq!(location(&res), "/");
        assert!(store.followed_ids(alice.id).await.unwrap().is_empty());
    }
}
