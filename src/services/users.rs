use anyhow::anyhow;
use argon2::Argon2;
use axum::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::error::ServiceError;
use crate::models::user::*;
use crate::models::{UserId, ValidationErrors};
use crate::schema;

use super::{DbStore, Svc};

#[async_trait]
pub trait UserService: Svc {
    async fn create_user(&self, user: &NewUser) -> Result<User, ServiceError>;
    async fn find_user(&self, id: UserId) -> Result<Option<User>, ServiceError>;
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, ServiceError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn get_users(&self, offset: i32, limit: i64) -> Result<Vec<User>, ServiceError>;
    /// Removes the user along with their microposts and every follow edge touching them.
    async fn delete_user(&self, id: UserId) -> Result<(), ServiceError>;

    async fn sign_up(&self, form: &SignUp) -> Result<User, ServiceError> {
        form.validate()?;
        let digest = hash_password(&form.password)?;
        self.create_user(&NewUser::new(&form.name, &form.email, digest))
            .await
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, ServiceError> {
        let user = self.find_by_email(email).await?;
        Ok(user.filter(|u| verify_password(password, &u.password_digest)))
    }
}

pub(crate) fn email_taken() -> ServiceError {
    ServiceError::Validation(ValidationErrors::single("email", "has already been taken"))
}

/// Hash a plain password with argon2id.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("password hashing failed: {e}").into())
}

/// Verify a password against an argon2id hash.
pub fn verify_password(password: &str, digest: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[async_trait]
impl UserService for DbStore {
    #[tracing::instrument(skip_all, fields(email = %u.email))]
    async fn create_user(&self, u: &NewUser) -> Result<User, ServiceError> {
        use schema::users::dsl::*;

        let mut conn = self.db.get().await?;

        let user = diesel::insert_into(users)
            .values(u)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(ServiceError::from)
            .map_err(|e| match e {
                ServiceError::ConstraintViolation(_) => email_taken(),
                other => other,
            })?;

        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, ServiceError> {
        use schema::users::dsl::*;

        let mut conn = self.db.get().await?;
        let user = users
            .find(user_id)
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(user)
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, ServiceError> {
        use schema::users::dsl::*;

        let mut conn = self.db.get().await?;
        let us = users
            .filter(id.eq_any(ids))
            .order(id.asc())
            .select(User::as_select())
            .load(&mut conn)
            .await?;
        Ok(us)
    }

    async fn find_by_email(&self, address: &str) -> Result<Option<User>, ServiceError> {
        use schema::users::dsl::*;

        let mut conn = self.db.get().await?;
        let user = users
            .filter(email.eq(normalize_email(address)))
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(user)
    }

    async fn get_users(&self, offset: i32, limit: i64) -> Result<Vec<User>, ServiceError> {
        use schema::users::dsl::*;

        let mut conn = self.db.get().await?;
        let us: Vec<User> = users
            .filter(id.gt(offset))
            .order(id.asc())
            .limit(limit)
            .select(User::as_select())
            .load(&mut conn)
            .await?;
        Ok(us)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_user(&self, user_id: UserId) -> Result<(), ServiceError> {
        use schema::users::dsl::*;

        let mut conn = self.db.get().await?;
        // microposts and relationships go with it through ON DELETE CASCADE
        let deleted = diesel::delete(users.find(user_id))
            .execute(&mut conn)
            .await?;
        if deleted == 0 {
            return Err(ServiceError::UnknownUser(user_id));
        }
        tracing::info!("user destroyed");
        Ok(())
    }
}
