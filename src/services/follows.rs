//! The follow graph: directed "follower observes followed" edges.
//!
//! Uniqueness of an edge is owned by the store (the composite primary key on
//! `relationships`), never by in-process locking. Two racing `follow` calls for
//! the same pair both succeed and leave exactly one edge behind.

use std::collections::BTreeSet;

use axum::async_trait;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::RunQueryDsl;

use crate::error::ServiceError;
use crate::models::relationship::NewRelationship;
use crate::models::UserId;
use crate::schema;

use super::{DbStore, Svc};

#[async_trait]
pub trait FollowGraph: Svc {
    /// Idempotent. Fails with [`ServiceError::InvalidTarget`] when `followed` is
    /// not a user and [`ServiceError::SelfFollow`] when both ids are the same.
    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError>;
    /// No-op when the edge is absent.
    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError>;
    async fn is_following(&self, follower: UserId, followed: UserId)
        -> Result<bool, ServiceError>;
    async fn followed_ids(&self, user: UserId) -> Result<BTreeSet<UserId>, ServiceError>;
    async fn follower_ids(&self, user: UserId) -> Result<BTreeSet<UserId>, ServiceError>;
}

/// A duplicate edge lost a race against a concurrent insert; the edge exists, which
/// is all `follow` promises.
pub(crate) fn collapse_duplicate(res: Result<(), ServiceError>) -> Result<(), ServiceError> {
    match res {
        Err(ServiceError::ConstraintViolation(detail)) => {
            tracing::debug!(%detail, "follow edge already present");
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl FollowGraph for DbStore {
    #[tracing::instrument(skip(self))]
    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError> {
        use schema::relationships::dsl::relationships;
        use schema::users::dsl::{id, users};

        if follower == followed {
            return Err(ServiceError::SelfFollow);
        }

        let mut conn = self.db.get().await?;

        let known: Vec<UserId> = users
            .filter(id.eq_any([follower, followed]))
            .select(id)
            .load(&mut conn)
            .await?;
        if !known.contains(&follower) {
            return Err(ServiceError::UnknownUser(follower));
        }
        if !known.contains(&followed) {
            return Err(ServiceError::InvalidTarget(followed));
        }

        let res = diesel::insert_into(relationships)
            .values(NewRelationship {
                follower_id: follower,
                followed_id: followed,
            })
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                // target destroyed between the lookup and the insert
                diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    ServiceError::InvalidTarget(followed)
                }
                other => other.into(),
            });
        collapse_duplicate(res)
    }

    #[tracing::instrument(skip(self))]
    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError> {
        use schema::relationships::dsl::*;

        let mut conn = self.db.get().await?;
        diesel::delete(relationships.find((follower, followed)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_following(
        &self,
        follower: UserId,
        followed: UserId,
    ) -> Result<bool, ServiceError> {
        use schema::relationships::dsl::*;

        let mut conn = self.db.get().await?;
        let exists = diesel::select(diesel::dsl::exists(
            relationships.find((follower, followed)),
        ))
        .get_result::<bool>(&mut conn)
        .await?;
        Ok(exists)
    }

    async fn followed_ids(&self, user: UserId) -> Result<BTreeSet<UserId>, ServiceError> {
        use schema::relationships::dsl::*;

        let mut conn = self.db.get().await?;
        let ids: Vec<UserId> = relationships
            .filter(follower_id.eq(user))
            .select(followed_id)
            .load(&mut conn)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn follower_ids(&self, user: UserId) -> Result<BTreeSet<UserId>, ServiceError> {
        use schema::relationships::dsl::*;

        let mut conn = self.db.get().await?;
        let ids: Vec<UserId> = relationships
            .filter(followed_id.eq(user))
            .select(follower_id)
            .load(&mut conn)
            .await?;
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::services::memory::MemoryStore;
    use crate::services::tests::{db_store, fresh_user, user};
    use crate::services::users::UserService;

    #[tokio::test]
    async fn follow_is_visible_from_both_ends() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;

        store.follow(a.id, b.id).await.unwrap();

        assert!(store.is_following(a.id, b.id).await.unwrap());
        assert!(!store.is_following(b.id, a.id).await.unwrap());
        assert!(store.followed_ids(a.id).await.unwrap().contains(&b.id));
        assert!(store.follower_ids(b.id).await.unwrap().contains(&a.id));
    }

    #[tokio::test]
    async fn unfollow_round_trip() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;

        store.follow(a.id, b.id).await.unwrap();
        store.unfollow(a.id, b.id).await.unwrap();

        assert!(!store.is_following(a.id, b.id).await.unwrap());
        assert!(store.followed_ids(a.id).await.unwrap().is_empty());
        assert!(store.follower_ids(b.id).await.unwrap().is_empty());

        // absent edge
        store.unfollow(a.id, b.id).await.unwrap();
    }

    #[tokio::test]
    async fn follow_twice_keeps_one_edge() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;

        store.follow(a.id, b.id).await.unwrap();
        store.follow(a.id, b.id).await.unwrap();

        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.followed_ids(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn racing_follows_keep_one_edge() {
        let store = Arc::new(MemoryStore::new());
        let a = user(&*store, "a").await.id;
        let b = user(&*store, "b").await.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.follow(a, b).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.edge_count(), 1);
    }

    #[tokio::test]
    async fn following_a_missing_user_is_an_invalid_target() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;

        let err = store.follow(a.id, 999).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTarget(999)));
        assert_eq!(store.edge_count(), 0);
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await;

        let err = store.follow(a.id, a.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::SelfFollow));
        assert!(!store.is_following(a.id, a.id).await.unwrap());
    }

    #[test]
    fn duplicate_constraint_collapses_to_success() {
        let dup = Err(ServiceError::ConstraintViolation("duplicate key".into()));
        assert!(collapse_duplicate(dup).is_ok());
        assert!(collapse_duplicate(Err(ServiceError::SelfFollow)).is_err());
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database at DATABASE_URL"]
    async fn postgres_follow_twice_keeps_one_edge() {
        let store = db_store().await;
        let a = fresh_user(&store, "a").await;
        let b = fresh_user(&store, "b").await;

        store.follow(a.id, b.id).await.unwrap();
        // hits the composite primary key and collapses
        store.follow(a.id, b.id).await.unwrap();

        assert_eq!(store.followed_ids(a.id).await.unwrap().len(), 1);
        assert_eq!(store.follower_ids(b.id).await.unwrap().len(), 1);

        store.delete_user(a.id).await.unwrap();
        store.delete_user(b.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database at DATABASE_URL"]
    async fn postgres_racing_follows_keep_one_edge() {
        let store = db_store().await;
        let a = fresh_user(&store, "a").await.id;
        let b = fresh_user(&store, "b").await.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.follow(a, b).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.follower_ids(b).await.unwrap().len(), 1);

        store.delete_user(a).await.unwrap();
        store.delete_user(b).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database at DATABASE_URL"]
    async fn postgres_rejects_missing_target_and_self_follow() {
        let store = db_store().await;
        let a = fresh_user(&store, "a").await;

        assert!(matches!(
            store.follow(a.id, -1).await.unwrap_err(),
            ServiceError::InvalidTarget(-1)
        ));
        assert!(matches!(
            store.follow(a.id, a.id).await.unwrap_err(),
            ServiceError::SelfFollow
        ));
        assert!(store.followed_ids(a.id).await.unwrap().is_empty());

        store.delete_user(a.id).await.unwrap();
    }
}
