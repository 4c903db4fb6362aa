use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::{MicropostId, UserId, ValidationErrors};

pub const MAX_CONTENT_LENGTH: usize = 140;

#[derive(Deserialize, Debug)]
pub struct CreatePost {
    pub content: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::microposts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewMicropost<'a> {
    pub user_id: UserId,
    pub content: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::microposts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Micropost {
    pub id: MicropostId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub fn validate_content(content: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    if content.trim().is_empty() {
        errors.add("content", "can't be blank");
    } else if content.chars().count() > MAX_CONTENT_LENGTH {
        errors.add(
            "content",
            format!("is too long (maximum is {MAX_CONTENT_LENGTH} characters)"),
        );
    }
    errors
}

/// Newest first; the id breaks ties between posts created in the same instant.
pub fn sort_newest_first(posts: &mut [Micropost]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
