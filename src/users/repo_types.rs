use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

/// User record as read back from the store. The password column is never
/// selected, so there is no field to leak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub birthdate: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Candidate record handed to the store on creation; `password` already holds the hash.
#[derive(Debug, Clone, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 255, message = "name must not be empty"))]
    pub name: String,
    #[validate(
        email(message = "email must be a valid email address"),
        length(max = 255, message = "email is too long")
    )]
    pub email: String,
    #[validate(length(max = 64, message = "birthdate is too long"))]
    pub birthdate: Option<String>,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}
