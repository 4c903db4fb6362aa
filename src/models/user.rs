use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ValidationErrors, UserId};

pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_NAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i-u)\A[\w+\-.]+@[a-z\d\-.]+\.[a-z]+\z").expect("email pattern compiles")
});

// the input to our `create_user` handler
#[derive(Deserialize, Debug, Clone)]
pub struct SignUp {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.extend(validate_name(&self.name));
        errors.extend(validate_email(&self.email));
        errors.extend(validate_password(&self.password, &self.password_confirmation));
        errors.into_result()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_digest: String,
}

impl NewUser {
    /// Email addresses are stored lower-cased so uniqueness is case-insensitive.
    pub fn new(name: &str, email: &str, password_digest: String) -> Self {
        Self {
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_digest,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_name(name: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    // measured on the trimmed value, which is what `NewUser::new` stores
    let len = name.trim().chars().count();
    if len == 0 {
        errors.add("name", "can't be blank");
    } else if len < MIN_NAME_LENGTH {
        errors.add(
            "name",
            format!("is too short (minimum is {MIN_NAME_LENGTH} characters)"),
        );
    } else if len > MAX_NAME_LENGTH {
        errors.add(
            "name",
            format!("is too long (maximum is {MAX_NAME_LENGTH} characters)"),
        );
    }
    errors
}

pub fn validate_email(email: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    if email.trim().is_empty() {
        errors.add("email", "can't be blank");
    } else if !EMAIL_REGEX.is_match(email) {
        errors.add("email", "is invalid");
    }
    errors
}

pub fn validate_password(password: &str, confirmation: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    if password.trim().is_empty() {
        errors.add("password", "can't be blank");
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("is too short (minimum is {MIN_PASSWORD_LENGTH} characters)"),
        );
    }
    if confirmation.trim().is_empty() {
        errors.add("password_confirmation", "can't be blank");
    } else if password != confirmation {
        errors.add("password_confirmation", "doesn't match password");
    }
    errors
}
