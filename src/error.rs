use std::fmt::Debug;
use std::fmt::Display;

use axum::response::Html;
use axum::{http::StatusCode, response::IntoResponse};
use diesel::result::DatabaseErrorKind;
use diesel_async::pooled_connection::deadpool::PoolError;
use thiserror::Error;

use crate::models::{UserId, ValidationErrors};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("follow target {0} does not exist")]
    InvalidTarget(UserId),

    #[error("user {0} does not exist")]
    UnknownUser(UserId),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("users cannot follow themselves")]
    SelfFollow,

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("database error: {0}")]
    Database(diesel::result::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<diesel::result::Error> for ServiceError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::ConstraintViolation(info.message().to_string())
            }
            other => Self::Database(other),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

pub struct AppError {
    pub inner: anyhow::Error,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self.inner.downcast_ref::<ServiceError>() {
            Some(ServiceError::UnknownUser(_)) => StatusCode::NOT_FOUND,
            Some(ServiceError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self.inner, "request failed");
        }
        (status, Html(format!("Something went wrong: {}", self.inner))).into_response()
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self { inner: err.into() }
    }
}
