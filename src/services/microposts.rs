use axum::async_trait;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::RunQueryDsl;

use crate::error::ServiceError;
use crate::models::post::*;
use crate::models::{MicropostId, UserId};
use crate::schema;

use super::{DbStore, Svc};

#[async_trait]
pub trait MicropostService: Svc {
    async fn create_micropost(&self, owner: UserId, content: &str)
        -> Result<Micropost, ServiceError>;
    /// Returns `false` when the post does not exist or belongs to someone else.
    async fn destroy_micropost(&self, owner: UserId, id: MicropostId)
        -> Result<bool, ServiceError>;
    /// Newest first.
    async fn microposts_by(&self, owner: UserId) -> Result<Vec<Micropost>, ServiceError>;
}

#[async_trait]
impl MicropostService for DbStore {
    #[tracing::instrument(skip(self, content))]
    async fn create_micropost(
        &self,
        owner: UserId,
        content: &str,
    ) -> Result<Micropost, ServiceError> {
        use schema::microposts::dsl::microposts;

        validate_content(content).into_result()?;

        let mut conn = self.db.get().await?;
        let post = diesel::insert_into(microposts)
            .values(NewMicropost {
                user_id: owner,
                content,
            })
            .returning(Micropost::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    ServiceError::UnknownUser(owner)
                }
                other => other.into(),
            })?;
        Ok(post)
    }

    #[tracing::instrument(skip(self))]
    async fn destroy_micropost(
        &self,
        owner: UserId,
        post_id: MicropostId,
    ) -> Result<bool, ServiceError> {
        use schema::microposts::dsl::*;

        let mut conn = self.db.get().await?;
        let deleted = diesel::delete(microposts.filter(id.eq(post_id).and(user_id.eq(owner))))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn microposts_by(&self, owner: UserId) -> Result<Vec<Micropost>, ServiceError> {
        use schema::microposts::dsl::*;

        let mut conn = self.db.get().await?;
        let posts = microposts
            .filter(user_id.eq(owner))
            .order((created_at.desc(), id.desc()))
            .select(Micropost::as_select())
            .load(&mut conn)
            .await?;
        Ok(posts)
    }
}
