use std::fmt;

use serde::{Deserialize, Serialize};

use crate::users::repo_types::User;

/// Request body for `POST /users`.
///
/// Missing strings deserialize as empty so they surface as validation
/// violations instead of a body-parsing rejection.
#[derive(Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("birthdate", &self.birthdate)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Response returned after creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedUserResponse {
    pub user: User,
}

/// Query string of `GET /users`.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    /// JSON object of field -> value equality filters.
    pub filter: Option<String>,
    /// `<op><date>`, e.g. `>=2024-01-01`.
    pub created_at: Option<String>,
}
