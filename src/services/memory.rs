//! In-memory store for tests and database-less runs.
//!
//! Mirrors the constraints of the Postgres schema: emails are unique per
//! lower-cased address, follow edges are unique per ordered pair, and destroying a
//! user removes their microposts and every edge touching them.
//!
//! There are no transactions here. Rows that reference a user are inserted first
//! and the user is looked up again afterwards; if a concurrent `delete_user` got
//! in between, the row is taken back out.

use std::collections::BTreeSet;
#[cfg(test)]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use axum::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::error::ServiceError;
use crate::models::post::{sort_newest_first, validate_content, Micropost};
use crate::models::relationship::NewRelationship;
use crate::models::user::{normalize_email, NewUser, User};
use crate::models::{MicropostId, UserId};

use super::follows::collapse_duplicate;
use super::users::email_taken;
use super::{FeedService, FollowGraph, MicropostService, Svc, UserService};

#[derive(Default)]
struct Tables {
    users: DashMap<UserId, User>,
    emails: DashMap<String, UserId>,
    microposts: DashMap<MicropostId, Micropost>,
    relationships: DashSet<NewRelationship>,
    user_seq: AtomicI32,
    micropost_seq: AtomicI32,
    #[cfg(test)]
    fail_lookups: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl Svc for MemoryStore {}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn edge_count(&self) -> usize {
        self.tables.relationships.len()
    }

    /// Makes every `find_user` fail, standing in for an unreachable database.
    #[cfg(test)]
    pub fn fail_user_lookups(&self) {
        self.tables.fail_lookups.store(true, Ordering::Relaxed);
    }

    fn user_exists(&self, id: UserId) -> bool {
        self.tables.users.contains_key(&id)
    }
}

fn next_id(seq: &AtomicI32) -> i32 {
    seq.fetch_add(1, Ordering::Relaxed) + 1
}

#[async_trait]
impl UserService for MemoryStore {
    async fn create_user(&self, u: &NewUser) -> Result<User, ServiceError> {
        let email = normalize_email(&u.email);
        match self.tables.emails.entry(email.clone()) {
            Entry::Occupied(_) => Err(email_taken()),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let user = User {
                    id: next_id(&self.tables.user_seq),
                    name: u.name.clone(),
                    email,
                    password_digest: u.password_digest.clone(),
                    created_at: now,
                    updated_at: now,
                };
                self.tables.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user)
            }
        }
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, ServiceError> {
        #[cfg(test)]
        if self.tables.fail_lookups.load(Ordering::Relaxed) {
            return Err(ServiceError::Other(anyhow::anyhow!("user lookups disabled")));
        }
        Ok(self.tables.users.get(&id).map(|u| u.clone()))
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, ServiceError> {
        let mut found: Vec<User> = ids
            .iter()
            .filter_map(|id| self.tables.users.get(id).map(|u| u.clone()))
            .collect();
        found.sort_by_key(|u| u.id);
        found.dedup_by_key(|u| u.id);
        Ok(found)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let id = self
            .tables
            .emails
            .get(&normalize_email(email))
            .map(|id| *id);
        Ok(id.and_then(|id| self.tables.users.get(&id).map(|u| u.clone())))
    }

    async fn get_users(&self, offset: i32, limit: i64) -> Result<Vec<User>, ServiceError> {
        let mut us: Vec<User> = self
            .tables
            .users
            .iter()
            .filter(|u| u.id > offset)
            .map(|u| u.clone())
            .collect();
        us.sort_by_key(|u| u.id);
        us.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(us)
    }

    async fn delete_user(&self, id: UserId) -> Result<(), ServiceError> {
        let (_, user) = self
            .tables
            .users
            .remove(&id)
            .ok_or(ServiceError::UnknownUser(id))?;
        self.tables.emails.remove(&user.email);
        self.tables.microposts.retain(|_, p| p.user_id != id);
        self.tables
            .relationships
            .retain(|edge| edge.follower_id != id && edge.followed_id != id);
        Ok(())
    }
}

#[async_trait]
impl MicropostService for MemoryStore {
    async fn create_micropost(
        &self,
        owner: UserId,
        content: &str,
    ) -> Result<Micropost, ServiceError> {
        validate_content(content).into_result()?;
        if !self.user_exists(owner) {
            return Err(ServiceError::UnknownUser(owner));
        }

        let post = Micropost {
            id: next_id(&self.tables.micropost_seq),
            user_id: owner,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.tables.microposts.insert(post.id, post.clone());
        if !self.user_exists(owner) {
            self.tables.microposts.remove(&post.id);
            return Err(ServiceError::UnknownUser(owner));
        }
        Ok(post)
    }

    async fn destroy_micropost(
        &self,
        owner: UserId,
        id: MicropostId,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .tables
            .microposts
            .remove_if(&id, |_, p| p.user_id == owner)
            .is_some())
    }

    async fn microposts_by(&self, owner: UserId) -> Result<Vec<Micropost>, ServiceError> {
        let mut posts: Vec<Micropost> = self
            .tables
            .microposts
            .iter()
            .filter(|p| p.user_id == owner)
            .map(|p| p.clone())
            .collect();
        sort_newest_first(&mut posts);
        Ok(posts)
    }
}

#[async_trait]
impl FollowGraph for MemoryStore {
    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError> {
        if follower == followed {
            return Err(ServiceError::SelfFollow);
        }
        if !self.user_exists(follower) {
            return Err(ServiceError::UnknownUser(follower));
        }
        if !self.user_exists(followed) {
            return Err(ServiceError::InvalidTarget(followed));
        }

        let edge = NewRelationship {
            follower_id: follower,
            followed_id: followed,
        };
        let res = if self.tables.relationships.insert(edge) {
            Ok(())
        } else {
            Err(ServiceError::ConstraintViolation(format!(
                "edge ({follower}, {followed}) already exists"
            )))
        };
        if !self.user_exists(follower) || !self.user_exists(followed) {
            self.tables.relationships.remove(&edge);
            return Err(if self.user_exists(follower) {
                ServiceError::InvalidTarget(followed)
            } else {
                ServiceError::UnknownUser(follower)
            });
        }
        collapse_duplicate(res)
    }

    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), ServiceError> {
        self.tables.relationships.remove(&NewRelationship {
            follower_id: follower,
            followed_id: followed,
        });
        Ok(())
    }

    async fn is_following(
        &self,
        follower: UserId,
        followed: UserId,
    ) -> Result<bool, ServiceError> {
        Ok(self.tables.relationships.contains(&NewRelationship {
            follower_id: follower,
            followed_id: followed,
        }))
    }

    async fn followed_ids(&self, user: UserId) -> Result<BTreeSet<UserId>, ServiceError> {
        Ok(self
            .tables
            .relationships
            .iter()
            .filter(|edge| edge.follower_id == user)
            .map(|edge| edge.followed_id)
            .collect())
    }

    async fn follower_ids(&self, user: UserId) -> Result<BTreeSet<UserId>, ServiceError> {
        Ok(self
            .tables
            .relationships
            .iter()
            .filter(|edge| edge.followed_id == user)
            .map(|edge| edge.follower_id)
            .collect())
    }
}

#[async_trait]
impl FeedService for MemoryStore {
    async fn feed(&self, user: UserId) -> Result<Vec<Micropost>, ServiceError> {
        if !self.user_exists(user) {
            return Err(ServiceError::UnknownUser(user));
        }
        let followed = self.followed_ids(user).await?;

        let mut posts: Vec<Micropost> = self
            .tables
            .microposts
            .iter()
            .filter(|p| p.user_id == user || followed.contains(&p.user_id))
            .map(|p| p.clone())
            .collect();
        sort_newest_first(&mut posts);
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::user;

    fn dangling_rows(store: &MemoryStore) -> usize {
        let edges = store
            .tables
            .relationships
            .iter()
            .filter(|e| !store.user_exists(e.follower_id) || !store.user_exists(e.followed_id))
            .count();
        let posts = store
            .tables
            .microposts
            .iter()
            .filter(|p| !store.user_exists(p.user_id))
            .count();
        edges + posts
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_racing_a_delete_leave_nothing_behind() {
        let store = MemoryStore::new();
        for round in 0..200 {
            let a = user(&store, &format!("a{round}")).await.id;
            let b = user(&store, &format!("b{round}")).await.id;

            let follow = tokio::spawn({
                let store = store.clone();
                async move { store.follow(a, b).await }
            });
            let post = tokio::spawn({
                let store = store.clone();
                async move { store.create_micropost(b, "last words").await }
            });
            let delete = tokio::spawn({
                let store = store.clone();
                async move { store.delete_user(b).await }
            });

            delete.await.unwrap().unwrap();
            match follow.await.unwrap() {
                Ok(()) | Err(ServiceError::InvalidTarget(_)) => {}
                Err(e) => panic!("unexpected follow error: {e}"),
            }
            match post.await.unwrap() {
                Ok(_) | Err(ServiceError::UnknownUser(_)) => {}
                Err(e) => panic!("unexpected micropost error: {e}"),
            }
        }

        assert_eq!(dangling_rows(&store), 0);
    }

    #[tokio::test]
    async fn follow_after_delete_is_an_invalid_target() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await.id;
        let b = user(&store, "b").await.id;
        store.delete_user(b).await.unwrap();

        assert!(matches!(
            store.follow(a, b).await.unwrap_err(),
            ServiceError::InvalidTarget(_)
        ));
        assert!(matches!(
            store.create_micropost(b, "hi").await.unwrap_err(),
            ServiceError::UnknownUser(_)
        ));
        assert_eq!(dangling_rows(&store), 0);
    }

    #[tokio::test]
    async fn failing_lookups_surface_as_errors() {
        let store = MemoryStore::new();
        let a = user(&store, "a").await.id;
        store.fail_user_lookups();
        assert!(matches!(
            store.find_user(a).await.unwrap_err(),
            ServiceError::Other(_)
        ));
    }
}
