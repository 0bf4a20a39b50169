use anyhow::Context;
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

/// Which store backs the user collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    /// `DATABASE_URL`; overrides the individual connection parts when set.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl DatabaseConfig {
    /// Connection options for the pool. Parts are passed to sqlx as-is, so
    /// credentials never go through URL escaping.
    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return url
                .parse::<PgConnectOptions>()
                .context("DATABASE_URL is not a valid postgres url");
        }

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match get("STORE_BACKEND") {
            Some(v) => v.parse::<StoreBackend>()?,
            None => StoreBackend::Postgres,
        };

        let url = get("DATABASE_URL").filter(|u| !u.trim().is_empty());
        let host = get("DB_HOST").unwrap_or_else(|| "127.0.0.1".into());
        let port = get("DB_PORT")
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("DB_PORT must be a valid port")?
            .unwrap_or(5432);
        let user = get("DB_USER").unwrap_or_else(|| "postgres".into());
        let password = get("DB_PASSWORD").filter(|p| !p.is_empty());
        let name = get("DB_NAME").unwrap_or_else(|| "users".into());

        let max_connections = get("DB_MAX_CONNECTIONS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("DB_MAX_CONNECTIONS must be a positive integer")?
            .unwrap_or(10);

        let run_migrations = get("DB_RUN_MIGRATIONS")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        let server = ServerConfig {
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: get("APP_PORT")
                .map(|v| v.parse::<u16>())
                .transpose()
                .context("APP_PORT must be a valid port")?
                .unwrap_or(8080),
        };

        Ok(Self {
            database: DatabaseConfig {
                backend,
                url,
                host,
                port,
                user,
                password,
                name,
                max_connections,
                run_migrations,
            },
            server,
        })
    }
}
