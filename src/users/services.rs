use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::users::{
    dto::CreateUserRequest,
    filter::{translate, PredicateSet, UserFilters},
    password::hash_password_blocking,
    repo::UserRepository,
    repo_types::{NewUser, User},
    validation::check_candidate,
};

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Hash, validate, persist. Nothing is written when validation fails.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_user(&self, input: CreateUserRequest) -> AppResult<User> {
        let hashed = hash_password_blocking(input.password.clone()).await?;

        let candidate = NewUser {
            name: input.name,
            email: input.email,
            birthdate: input.birthdate,
            password: hashed,
        };

        let violations = check_candidate(&candidate, &input.password);
        if !violations.is_empty() {
            warn!(count = violations.len(), "user failed validation");
            return Err(AppError::Validation(violations));
        }

        let email = candidate.email.clone();
        match self.repo.save(candidate).await {
            Ok(user) => {
                info!(user_id = %user.id, "user created");
                Ok(user)
            }
            Err(e) if e.is_duplicate_email() => {
                warn!("email already registered");
                Err(AppError::DuplicateEmail(email))
            }
            Err(e) => {
                error!(error = %e, "save user failed");
                Err(AppError::Storage(e))
            }
        }
    }

    /// `None` when no record has this id; the caller decides if that is an error.
    #[instrument(skip(self))]
    pub async fn find_one(&self, id: Uuid) -> AppResult<Option<User>> {
        let mut rows = self.repo.find(&PredicateSet::by_id(id)).await.map_err(|e| {
            error!(error = %e, "find user failed");
            AppError::Storage(e)
        })?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Matching records in insertion order; an empty result is not an error here.
    #[instrument(skip(self, filters))]
    pub async fn find_all_by_filters(&self, filters: &UserFilters) -> AppResult<Vec<User>> {
        let predicates = translate(filters).map_err(|e| {
            warn!(error = %e, "invalid filter");
            e
        })?;
        if predicates.is_empty() {
            tracing::debug!("listing without filters");
        }

        self.repo.find(&predicates).await.map_err(|e| {
            error!(error = %e, "list users failed");
            AppError::Storage(e)
        })
    }
}
