//! MySQL connection pool with schema helpers, on top of SQLx

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};

use crate::env::{get_env_int, get_env_string};
use crate::error::{CommonError, Result};

const DEFAULT_MAX_OPEN_CONNS: u32 = 10;
const DEFAULT_MAX_IDLE_CONNS: u32 = 2;

/// A table managed by [`MySqlConnectionPool::auto_migrate`] and
/// [`MySqlConnectionPool::drop_tables`].
pub trait TableModel: Send + Sync {
    /// Table name, used for `DROP TABLE`
    fn table_name(&self) -> &str;

    /// Idempotent DDL, e.g. `CREATE TABLE IF NOT EXISTS ...`
    fn create_table_sql(&self) -> String;
}

/// Connection settings for [`MySqlConnectionPool`]
#[derive(Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: String,
    pub database: String,
    /// Upper bound on open connections; 0 falls back to the default
    pub max_open_conns: u32,
    /// Connections kept open while idle, capped at `max_open_conns`
    pub max_idle_conns: u32,
}

impl DatabaseConfig {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            host: host.into(),
            port: port.into(),
            database: database.into(),
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
        }
    }

    pub fn with_pool_limits(mut self, max_open_conns: u32, max_idle_conns: u32) -> Self {
        self.max_open_conns = max_open_conns;
        self.max_idle_conns = max_idle_conns;
        self
    }

    /// Read `MYSQL_USER`, `MYSQL_PASSWORD`, `MYSQL_HOST`, `MYSQL_PORT`,
    /// `MYSQL_DATABASE`, `MYSQL_MAX_OPEN_CONNS` and `MYSQL_MAX_IDLE_CONNS`.
    pub fn from_env() -> Self {
        let max_open = get_env_int("MYSQL_MAX_OPEN_CONNS", DEFAULT_MAX_OPEN_CONNS as i64);
        let max_idle = get_env_int("MYSQL_MAX_IDLE_CONNS", DEFAULT_MAX_IDLE_CONNS as i64);

        Self::new(
            get_env_string("MYSQL_USER", ""),
            get_env_string("MYSQL_PASSWORD", ""),
            get_env_string("MYSQL_HOST", "localhost"),
            get_env_string("MYSQL_PORT", "3306"),
            get_env_string("MYSQL_DATABASE", ""),
        )
        .with_pool_limits(
            u32::try_from(max_open).unwrap_or(DEFAULT_MAX_OPEN_CONNS),
            u32::try_from(max_idle).unwrap_or(DEFAULT_MAX_IDLE_CONNS),
        )
    }

    /// Connection string with the password masked, safe to log
    pub fn dsn(&self) -> String {
        format!(
            "{}:***@tcp({}:{})/{}",
            self.user, self.host, self.port, self.database
        )
    }

    fn validate(&self) -> Result<u16> {
        let missing: Vec<&str> = [
            ("user", &self.user),
            ("password", &self.password),
            ("host", &self.host),
            ("port", &self.port),
            ("database", &self.database),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(CommonError::ConfigError(format!(
                "missing required configuration parameters: {}",
                missing.join(", ")
            )));
        }

        self.port
            .parse::<u16>()
            .map_err(|e| CommonError::ConfigError(format!("invalid port {:?}: {}", self.port, e)))
    }

    fn connect_options(&self) -> Result<MySqlConnectOptions> {
        let port = self.validate()?;
        Ok(MySqlConnectOptions::new()
            .host(&self.host)
            .port(port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database))
    }

    fn pool_options(&self) -> MySqlPoolOptions {
        let max_open = if self.max_open_conns == 0 {
            DEFAULT_MAX_OPEN_CONNS
        } else {
            self.max_open_conns
        };

        MySqlPoolOptions::new()
            .max_connections(max_open)
            .min_connections(self.max_idle_conns.min(max_open))
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("dsn", &self.dsn())
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .finish()
    }
}

/// Pooled MySQL connections plus the models whose tables it manages
#[derive(Clone)]
pub struct MySqlConnectionPool {
    pool: MySqlPool,
    models: Vec<Arc<dyn TableModel>>,
}

impl MySqlConnectionPool {
    /// Validate `config`, connect, and apply the pool limits.
    pub async fn initialize(
        config: DatabaseConfig,
        models: Vec<Arc<dyn TableModel>>,
    ) -> Result<Self> {
        let options = config.connect_options()?;
        debug!(dsn = %config.dsn(), "Connecting to database");

        let pool = config
            .pool_options()
            .connect_with(options)
            .await
            .map_err(|e| CommonError::DatabaseError(format!("Failed to connect: {}", e)))?;

        info!(
            host = %config.host,
            database = %config.database,
            "Database connection pool established"
        );
        Ok(Self { pool, models })
    }

    /// Like [`initialize`](Self::initialize), but connections are opened on first use.
    pub fn initialize_lazy(
        config: DatabaseConfig,
        models: Vec<Arc<dyn TableModel>>,
    ) -> Result<Self> {
        let options = config.connect_options()?;
        debug!(dsn = %config.dsn(), "Creating lazy database pool");

        let pool = config.pool_options().connect_lazy_with(options);
        Ok(Self { pool, models })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn models(&self) -> &[Arc<dyn TableModel>] {
        &self.models
    }

    /// Create every registered table, in registration order.
    pub async fn auto_migrate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(CommonError::ConfigError("no models to migrate".into()));
        }

        for model in &self.models {
            sqlx::query(&model.create_table_sql())
                .execute(&self.pool)
                .await?;
            debug!(table = model.table_name(), "Table migrated");
        }

        info!(tables = self.models.len(), "Schema migration complete");
        Ok(())
    }

    /// Drop every registered table, in reverse registration order.
    pub async fn drop_tables(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(CommonError::ConfigError("no models to drop".into()));
        }

        for model in self.models.iter().rev() {
            sqlx::query(&drop_table_sql(model.table_name()))
                .execute(&self.pool)
                .await?;
            debug!(table = model.table_name(), "Table dropped");
        }

        Ok(())
    }

    /// Close every connection in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

fn drop_table_sql(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS `{}`", table_name.replace('`', "``"))
}
