use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::debug;

use crate::users::filter::{CreatedAtPredicate, Equality, PredicateSet};
use crate::users::repo_types::{NewUser, User};

/// Name of the unique constraint on `users.email`.
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated ({})", .constraint.as_deref().unwrap_or("unknown"))]
    UniqueViolation { constraint: Option<String> },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Sorts a driver error into a unique violation or a plain database error.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::UniqueViolation {
                    constraint: db.constraint().map(str::to_string),
                };
            }
        }
        StoreError::Database(err)
    }

    pub fn is_duplicate_email(&self) -> bool {
        match self {
            StoreError::UniqueViolation { constraint } => constraint
                .as_deref()
                .map_or(true, |c| c == EMAIL_UNIQUE_CONSTRAINT),
            StoreError::Database(_) => false,
        }
    }
}

/// Persistence seam for user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Records matching every predicate, oldest first in insertion order.
    async fn find(&self, predicates: &PredicateSet) -> Result<Vec<User>, StoreError>;

    /// Inserts the candidate; the store assigns `id` and `created_at`.
    async fn save(&self, user: NewUser) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn next_clause(qb: &mut QueryBuilder<'_, Postgres>, clauses: &mut usize) {
    qb.push(if *clauses == 0 { " WHERE " } else { " AND " });
    *clauses += 1;
}

fn push_predicates(qb: &mut QueryBuilder<'_, Postgres>, predicates: &PredicateSet) {
    let mut clauses = 0usize;

    for eq in &predicates.equalities {
        next_clause(qb, &mut clauses);
        qb.push(eq.column()).push(" = ");
        match eq {
            Equality::Id(id) => qb.push_bind(*id),
            Equality::Name(v) | Equality::Email(v) | Equality::Birthdate(v) => {
                qb.push_bind(v.clone())
            }
        };
    }

    match &predicates.created_at {
        Some(CreatedAtPredicate::Compare(op, value)) => {
            next_clause(qb, &mut clauses);
            qb.push("created_at ")
                .push(op.as_sql())
                .push(" ")
                .push_bind(*value);
        }
        Some(CreatedAtPredicate::Between(start, end)) => {
            next_clause(qb, &mut clauses);
            qb.push("created_at BETWEEN ")
                .push_bind(*start)
                .push(" AND ")
                .push_bind(*end);
        }
        None => {}
    }
}

/// `seq` is an identity column, so it follows insertion even when rows
/// share a `created_at`.
fn select_users(predicates: &PredicateSet) -> QueryBuilder<'static, Postgres> {
    let mut qb =
        QueryBuilder::<Postgres>::new("SELECT id, name, email, birthdate, created_at FROM users");
    push_predicates(&mut qb, predicates);
    qb.push(" ORDER BY seq ASC");
    qb
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find(&self, predicates: &PredicateSet) -> Result<Vec<User>, StoreError> {
        let mut qb = select_users(predicates);

        debug!(sql = %qb.sql(), "find users");
        let rows = qb
            .build_query_as::<User>()
            .fetch_all(&self.db)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(rows)
    }

    async fn save(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, birthdate, password)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, birthdate, created_at
            "#,
        )
        .bind(user.name)
        .bind(user.email)
        .bind(user.birthdate)
        .bind(user.password)
        .fetch_one(&self.db)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(row)
    }
}
