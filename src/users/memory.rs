use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::users::filter::PredicateSet;
use crate::users::repo::{StoreError, UserRepository, EMAIL_UNIQUE_CONSTRAINT};
use crate::users::repo_types::{NewUser, User};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    #[cfg(test)]
    password: String,
}

/// In-process store for local development and tests. Keeps insertion order
/// and enforces the same email uniqueness constraint as the database.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserRepository {
    rows: Arc<RwLock<Vec<StoredUser>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Stored hash for `email`, for checking what actually got persisted.
    #[cfg(test)]
    pub async fn password_of(&self, email: &str) -> Option<String> {
        self.rows
            .read()
            .await
            .iter()
            .find(|r| r.user.email == email)
            .map(|r| r.password.clone())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find(&self, predicates: &PredicateSet) -> Result<Vec<User>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| predicates.matches(&r.user))
            .map(|r| r.user.clone())
            .collect())
    }

    async fn save(&self, user: NewUser) -> Result<User, StoreError> {
        let mut rows = self.rows.write().await;

        if rows.iter().any(|r| r.user.email == user.email) {
            return Err(StoreError::UniqueViolation {
                constraint: Some(EMAIL_UNIQUE_CONSTRAINT.to_string()),
            });
        }

        let stored = StoredUser {
            user: User {
                id: Uuid::new_v4(),
                name: user.name,
                email: user.email,
                birthdate: user.birthdate,
                created_at: OffsetDateTime::now_utc(),
            },
            #[cfg(test)]
            password: user.password,
        };
        let saved = stored.user.clone();
        rows.push(stored);

        debug!(user_id = %saved.id, "stored user in memory");
        Ok(saved)
    }
}
