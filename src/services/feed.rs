use axum::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::RunQueryDsl;

use crate::error::ServiceError;
use crate::models::post::Micropost;
use crate::models::UserId;
use crate::schema;

use super::{DbStore, Svc};

#[async_trait]
pub trait FeedService: Svc {
    /// The home timeline of `user`: their own microposts plus those of everyone they
    /// follow, newest first. Recomputed on every call.
    async fn feed(&self, user: UserId) -> Result<Vec<Micropost>, ServiceError>;
}

#[async_trait]
impl FeedService for DbStore {
    #[tracing::instrument(skip(self))]
    async fn feed(&self, user: UserId) -> Result<Vec<Micropost>, ServiceError> {
        use schema::microposts::dsl::*;
        use schema::{relationships, users};

        let mut conn = self.db.get().await?;

        // one snapshot for the existence check and the timeline query
        let posts = conn
            .build_transaction()
            .read_only()
            .repeatable_read()
            .run(|conn| {
                async move {
                    let exists = diesel::select(diesel::dsl::exists(users::table.find(user)))
                        .get_result::<bool>(conn)
                        .await?;
                    if !exists {
                        return Err(ServiceError::UnknownUser(user));
                    }

                    let followed = relationships::table
                        .filter(relationships::follower_id.eq(user))
                        .select(relationships::followed_id);

                    let posts = microposts
                        .filter(user_id.eq(user).or(user_id.eq_any(followed)))
                        .order((created_at.desc(), id.desc()))
                        .select(Micropost::as_select())
                        .load(conn)
                        .await?;
                    Ok::<_, ServiceError>(posts)
                }
                .scope_boxed()
            })
            .await?;

        tracing::debug!(items = posts.len(), "feed assembled");
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::follows::FollowGraph;
    use crate::services::memory::MemoryStore;
    use crate::services::microposts::MicropostService;
    use crate::services::tests::{db_store, fresh_user, user};
    use crate::services::users::UserService;

    fn ids(posts: &[Micropost]) -> Vec<i32> {
        posts.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn own_and_followed_posts_newest_first() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        let c = user(&store, "c").await;

        store.follow(a.id, b.id).await.unwrap();
        let p1 = store.create_micropost(b.id, "p1").await.unwrap();
        let p2 = store.create_micropost(b.id, "p2").await.unwrap();
        let p0 = store.create_micropost(a.id, "p0").await.unwrap();
        store.create_micropost(c.id, "not for a").await.unwrap();

        let feed = store.feed(a.id).await.unwrap();
        assert_eq!(ids(&feed), [p0.id, p2.id, p1.id]);
        assert!(feed.iter().all(|p| p.user_id != c.id));
    }

    #[tokio::test]
    async fn no_follows_means_only_own_posts() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        let own = store.create_micropost(a.id, "mine").await.unwrap();
        store.create_micropost(b.id, "theirs").await.unwrap();

        let feed = store.feed(a.id).await.unwrap();
        assert_eq!(ids(&feed), [own.id]);
    }

    #[tokio::test]
    async fn follow_is_one_directional() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        store.follow(a.id, b.id).await.unwrap();
        store.create_micropost(a.id, "from a").await.unwrap();

        assert!(store.feed(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unfollow_drops_posts_from_feed() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        store.follow(a.id, b.id).await.unwrap();
        store.create_micropost(b.id, "hello").await.unwrap();
        assert_eq!(store.feed(a.id).await.unwrap().len(), 1);

        store.unfollow(a.id, b.id).await.unwrap();
        assert!(store.feed(a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_has_no_feed() {
        let store = MemoryStore::new();
        let err = store.feed(404).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownUser(404)));
    }

    #[tokio::test]
    async fn destroying_a_user_cascades() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        let c = user(&store, "c").await;
        store.follow(a.id, b.id).await.unwrap();
        store.follow(b.id, a.id).await.unwrap();
        store.follow(c.id, b.id).await.unwrap();
        store.create_micropost(b.id, "going away").await.unwrap();

        store.delete_user(b.id).await.unwrap();

        assert!(store.feed(a.id).await.unwrap().is_empty());
        assert!(store.feed(c.id).await.unwrap().is_empty());
        assert!(store.followed_ids(a.id).await.unwrap().is_empty());
        assert!(store.follower_ids(a.id).await.unwrap().is_empty());
        assert_eq!(store.edge_count(), 0);
        assert!(matches!(
            store.feed(b.id).await.unwrap_err(),
            ServiceError::UnknownUser(_)
        ));
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database at DATABASE_URL"]
    async fn postgres_own_and_followed_posts_newest_first() {
        let store = db_store().await;
        let a = fresh_user(&store, "a").await;
        let b = fresh_user(&store, "b").await;
        let c = fresh_user(&store, "c").await;

        store.follow(a.id, b.id).await.unwrap();
        let p1 = store.create_micropost(b.id, "p1").await.unwrap();
        let p2 = store.create_micropost(b.id, "p2").await.unwrap();
        let p0 = store.create_micropost(a.id, "p0").await.unwrap();
        store.create_micropost(c.id, "not for a").await.unwrap();

        assert_eq!(ids(&store.feed(a.id).await.unwrap()), [p0.id, p2.id, p1.id]);

        for u in [a, b, c] {
            store.delete_user(u.id).await.unwrap();
        }
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database at DATABASE_URL"]
    async fn postgres_destroying_a_user_cascades() {
        let store = db_store().await;
        let a = fresh_user(&store, "a").await;
        let b = fresh_user(&store, "b").await;
        store.follow(a.id, b.id).await.unwrap();
        store.follow(b.id, a.id).await.unwrap();
        store.create_micropost(b.id, "going away").await.unwrap();

        store.delete_user(b.id).await.unwrap();

        assert!(store.feed(a.id).await.unwrap().is_empty());
        assert!(store.followed_ids(a.id).await.unwrap().is_empty());
        assert!(store.follower_ids(a.id).await.unwrap().is_empty());
        assert!(store.microposts_by(b.id).await.unwrap().is_empty());
        assert!(matches!(
            store.feed(b.id).await.unwrap_err(),
            ServiceError::UnknownUser(_)
        ));

        store.delete_user(a.id).await.unwrap();
    }
}
