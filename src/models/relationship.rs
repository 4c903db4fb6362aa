use diesel::prelude::*;
use serde::Deserialize;

use super::UserId;

/// A directed follow edge: `follower_id` sees the posts of `followed_id`.
#[derive(Insertable, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[diesel(table_name = crate::schema::relationships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRelationship {
    pub follower_id: UserId,
    pub followed_id: UserId,
}

#[derive(Deserialize, Debug)]
pub struct FollowForm {
    pub followed_id: UserId,
}
