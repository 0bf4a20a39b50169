use crate::config::{AppConfig, DatabaseConfig, StoreBackend};
use crate::users::{
    memory::InMemoryUserRepository,
    repo::{PgUserRepository, UserRepository},
    services::UserService,
};
use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let repo = connect_store(&config.database).await?;
        Ok(Self::from_parts(repo, Arc::new(config)))
    }

    pub fn from_parts(repo: Arc<dyn UserRepository>, config: Arc<AppConfig>) -> Self {
        Self {
            users: UserService::new(repo),
            config,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "STORE_BACKEND" => Some("memory".into()),
            _ => None,
        })
        .expect("memory config");
        Self::from_parts(Arc::new(InMemoryUserRepository::new()), Arc::new(config))
    }
}

async fn connect_store(cfg: &DatabaseConfig) -> anyhow::Result<Arc<dyn UserRepository>> {
    match cfg.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory user store; data is lost on restart");
            Ok(Arc::new(InMemoryUserRepository::new()))
        }
        StoreBackend::Postgres => {
            let db = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .connect_with(cfg.connect_options()?)
                .await
                .context("connect to database")?;

            if cfg.run_migrations {
                apply_migrations(&db).await?;
            }

            Ok(Arc::new(PgUserRepository::new(db)))
        }
    }
}

async fn apply_migrations(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    tracing::info!("migrations applied");
    Ok(())
}
