//! Connection bootstrap and the pooled database handle.
//!
//! # Flow (MySQL)
//!
//! 1. Extract the database name and connect to the server without it,
//!    retrying with linear backoff
//! 2. `CREATE DATABASE IF NOT EXISTS`, then drop the bootstrap connection
//! 3. Open a pool scoped to the database with the configured limits
//! 4. `CREATE TABLE IF NOT EXISTS` for every table definition
//!
//! Postgres is accepted by the config but not implemented: it yields a
//! handle with no pool behind it.

use std::path::Path;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection};
use tracing::{info, warn};

use crate::config::{DatabaseConfig, DriverType};
use crate::dsn::{self, MySqlDsn};
use crate::error::{Error, Result};
use crate::mask::mask_credentials;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::schema::{self, TableDefinition};
use crate::tls::TlsProfile;

/// Lifecycle of a bootstrap and of the handle it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
    Failed,
    /// Terminal
    Closed,
}

/// Idle connections are reaped after this long
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
/// Reap delay when `maxIdle = 0`
const NO_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pool sizing derived from `maxOpen` / `maxIdle`.
///
/// `maxOpen` is the pool's `max_connections`. sqlx has no cap on idle
/// connections, so `maxIdle` is a ceiling only: the pool starts empty
/// (`min_connections = 0`), grows on demand and reaps idle connections after
/// [`idle_timeout`](Self::idle_timeout). `maxIdle = 0` reaps almost at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_open: u32,
    /// Never above `max_open`
    pub max_idle: u32,
}

impl PoolLimits {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let max_open = config.max_open.max(1);
        Self {
            max_open,
            max_idle: config.max_idle.min(max_open),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        if self.max_idle == 0 {
            NO_IDLE_TIMEOUT
        } else {
            IDLE_TIMEOUT
        }
    }

    pub fn pool_options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(self.max_open)
            .min_connections(0)
            .idle_timeout(self.idle_timeout())
    }
}

/// Handle to an opened database.
///
/// Owned by the caller until [`close`](Database::close). The pool inside
/// may be shared across tasks.
#[derive(Debug)]
pub struct Database {
    pool: Option<MySqlPool>,
    driver: DriverType,
    state: ConnectionState,
    name: Option<String>,
}

impl Database {
    /// Load `<dir>/configs/dao.toml` (plus `DAO_DATASOURCE`) and bootstrap
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let config = DatabaseConfig::load(dir)?.with_env_overrides();
        Self::connect(config).await
    }

    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        Bootstrapper::new(config).open().await
    }

    fn ready(pool: MySqlPool, name: String) -> Self {
        Self {
            pool: Some(pool),
            driver: DriverType::MySql,
            state: ConnectionState::Ready,
            name: Some(name),
        }
    }

    /// Handle for a driver without an implementation: ready, but no pool
    fn unbacked(driver: DriverType) -> Self {
        Self {
            pool: None,
            driver,
            state: ConnectionState::Ready,
            name: None,
        }
    }

    /// The live pool; `NotInitialized` when there is none
    pub fn pool(&self) -> Result<&MySqlPool> {
        match (&self.pool, self.state) {
            (Some(pool), ConnectionState::Ready) => Ok(pool),
            _ => Err(Error::NotInitialized),
        }
    }

    pub fn driver(&self) -> &DriverType {
        &self.driver
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Database the pool is scoped to
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Close the pool.
    ///
    /// Fails with `NotInitialized` when there is nothing to close, including
    /// a second call.
    pub async fn close(&mut self) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(Error::NotInitialized);
        }
        let pool = self.pool.take().ok_or(Error::NotInitialized)?;
        pool.close().await;
        self.state = ConnectionState::Closed;
        info!("Database connection closed");
        Ok(())
    }
}

/// Turns a [`DatabaseConfig`] into a ready [`Database`]
#[derive(Debug)]
pub struct Bootstrapper {
    config: DatabaseConfig,
    retry: RetryPolicy,
    tables: Vec<TableDefinition>,
    state: ConnectionState,
}

impl Bootstrapper {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            retry: RetryPolicy::default(),
            tables: schema::default_tables(),
            state: ConnectionState::Uninitialized,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the tables created after connecting
    pub fn with_tables(mut self, tables: Vec<TableDefinition>) -> Self {
        self.tables = tables;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub async fn open(&mut self) -> Result<Database> {
        match self.config.driver.clone() {
            DriverType::MySql => {
                self.state = ConnectionState::Connecting;
                match self.open_mysql().await {
                    Ok(db) => {
                        self.state = ConnectionState::Ready;
                        Ok(db)
                    }
                    Err(err) => {
                        self.state = ConnectionState::Failed;
                        Err(err)
                    }
                }
            }
            DriverType::Postgres => {
                // TODO: decide whether postgres gets a real pool or is rejected at config load
                warn!("postgres driver is not implemented; handle has no live connection");
                self.state = ConnectionState::Ready;
                Ok(Database::unbacked(DriverType::Postgres))
            }
            DriverType::Unsupported(value) => {
                self.state = ConnectionState::Failed;
                Err(Error::InvalidDriverType(value))
            }
        }
    }

    async fn open_mysql(&self) -> Result<Database> {
        self.config.validate()?;

        let datasource = &self.config.data_source;
        let parsed = MySqlDsn::parse(datasource)?;
        let name = target_database(datasource, &parsed)?;

        let mut server_opts = self.statement_logging(parsed.without_database().connect_options());
        let mut db_opts = self.statement_logging(parsed.with_database(&name).connect_options());

        if self.config.tls.enabled {
            let profile = TlsProfile::from_config(&self.config.tls)?;
            server_opts = profile.apply(server_opts);
            db_opts = profile.apply(db_opts);
        }

        info!(
            "Connecting to MySQL server using connection string: '{}'",
            mask_credentials(&dsn::strip_database(datasource))
        );
        let mut conn = retry_with_backoff(&self.retry, "MySQL connect", || server_opts.connect())
            .await
            .map_err(|exhausted| Error::ConnectionFailed {
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })?;

        let created = schema::create_database(&mut conn, &name).await;
        if let Err(e) = conn.close().await {
            warn!("Failed to close bootstrap connection: {}", e);
        }
        created?;

        info!(
            "Connecting to database '{}', using connection string: '{}'",
            name,
            mask_credentials(datasource)
        );
        let limits = PoolLimits::from_config(&self.config);
        let pool = limits
            .pool_options()
            .connect_with(db_opts)
            .await
            .map_err(|source| Error::ConnectionFailed {
                attempts: 1,
                source,
            })?;

        if let Err(err) = schema::create_tables(&pool, &self.tables).await {
            pool.close().await;
            return Err(err);
        }

        info!(
            "Database '{}' ready (max open {}, max idle {})",
            name, limits.max_open, limits.max_idle
        );
        Ok(Database::ready(pool, name))
    }

    fn statement_logging(&self, opts: MySqlConnectOptions) -> MySqlConnectOptions {
        if self.config.is_logger {
            opts
        } else {
            opts.disable_statement_logging()
        }
    }
}

/// Database the bootstrap creates and scopes the pool to, lowercased.
///
/// The parsed name wins; the pattern match is only a fallback, since socket
/// paths and passwords may contain `/`.
fn target_database(datasource: &str, parsed: &MySqlDsn) -> Result<String> {
    parsed
        .database
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase)
        .or_else(|| dsn::database_name(datasource))
        .ok_or_else(|| Error::schema("datasource does not name a database"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql_config(data_source: &str) -> DatabaseConfig {
        DatabaseConfig {
            data_source: data_source.to_string(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_pool_limits() {
        let limits = PoolLimits::from_config(&DatabaseConfig::default());
        assert_eq!(limits, PoolLimits { max_open: 30, max_idle: 30 });

        let mut config = DatabaseConfig::default();
        config.max_open = 5;
        config.max_idle = 50;
        assert_eq!(
            PoolLimits::from_config(&config),
            PoolLimits { max_open: 5, max_idle: 5 }
        );
    }

    #[test]
    fn test_max_idle_is_not_a_floor() {
        let limits = PoolLimits::from_config(&DatabaseConfig::default());
        let opts = limits.pool_options();
        assert_eq!(opts.get_max_connections(), 30);
        assert_eq!(opts.get_min_connections(), 0);
        assert_eq!(opts.get_idle_timeout(), Some(IDLE_TIMEOUT));

        let no_idle = PoolLimits { max_open: 4, max_idle: 0 };
        assert_eq!(no_idle.pool_options().get_idle_timeout(), Some(NO_IDLE_TIMEOUT));
    }

    #[test]
    fn test_target_database_prefers_parsed_name() {
        for (datasource, expected) in [
            ("app@unix(/var/run/mysqld/mysqld.sock)/App", "app"),
            ("user=app socket=/tmp/mysql.sock dbname=Orders", "orders"),
            ("root:p/w@tcp(db:3306)/mydb", "mydb"),
            ("root:secret@tcp(127.0.0.1:3306)/Switch?charset=utf8", "switch"),
        ] {
            let parsed = MySqlDsn::parse(datasource).unwrap();
            assert_eq!(
                target_database(datasource, &parsed).unwrap(),
                expected,
                "{datasource}"
            );
        }
    }

    #[test]
    fn test_target_database_missing() {
        let datasource = "root:pw@tcp(db:3306)/";
        let parsed = MySqlDsn::parse(datasource).unwrap();
        assert!(matches!(
            target_database(datasource, &parsed),
            Err(Error::Schema { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_driver_is_rejected() {
        let mut config = DatabaseConfig::default();
        config.driver = DriverType::from("oracle");

        let mut bootstrap = Bootstrapper::new(config);
        let err = bootstrap.open().await.unwrap_err();

        assert!(matches!(err, Error::InvalidDriverType(ref v) if v == "oracle"));
        assert_eq!(bootstrap.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_postgres_stub_has_no_connection() {
        let mut config = DatabaseConfig::default();
        config.driver = DriverType::Postgres;

        let mut bootstrap = Bootstrapper::new(config);
        let mut db = bootstrap.open().await.unwrap();

        assert_eq!(bootstrap.state(), ConnectionState::Ready);
        assert!(db.is_initialized());
        assert_eq!(db.driver(), &DriverType::Postgres);
        assert!(matches!(db.pool(), Err(Error::NotInitialized)));
        assert!(matches!(db.close().await, Err(Error::NotInitialized)));
    }

    #[tokio::test]
    async fn test_datasource_without_database() {
        let mut bootstrap = Bootstrapper::new(mysql_config("root:pw@tcp(127.0.0.1:3306)/"));
        let err = bootstrap.open().await.unwrap_err();

        assert!(matches!(err, Error::Schema { .. }));
        assert_eq!(bootstrap.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_tls_errors_surface_before_connecting() {
        let mut config = mysql_config("root:pw@tcp(127.0.0.1:1)/mydb");
        config.tls.enabled = true;
        config.tls.cert_file = String::new();
        config.tls.key_file = String::new();
        config.tls.ca_cert = "/nonexistent/dao/ca.pem".to_string();

        let err = Bootstrapper::new(config).open().await.unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_after_retries() {
        // Nothing listens on port 1
        let policy = RetryPolicy {
            max_retries: 2,
            step: Duration::from_millis(10),
        };
        let mut bootstrap = Bootstrapper::new(mysql_config("root:pw@tcp(127.0.0.1:1)/mydb"))
            .with_retry_policy(policy);

        let err = bootstrap.open().await.unwrap_err();

        assert!(matches!(err, Error::ConnectionFailed { attempts: 3, .. }));
        assert_eq!(bootstrap.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_slash_and_socket_datasources_reach_connect() {
        // Each of these names a valid database; bootstrap must get as far
        // as dialing the server instead of failing on the name
        let no_retry = RetryPolicy {
            max_retries: 0,
            step: Duration::from_millis(1),
        };
        for datasource in [
            "app@unix(/nonexistent/dao/mysqld.sock)/app",
            "user=app socket=/nonexistent/dao/mysql.sock dbname=orders",
            "root:p/w@tcp(127.0.0.1:1)/mydb",
        ] {
            let mut bootstrap =
                Bootstrapper::new(mysql_config(datasource)).with_retry_policy(no_retry);
            let err = bootstrap.open().await.unwrap_err();
            assert!(
                matches!(err, Error::ConnectionFailed { attempts: 1, .. }),
                "{datasource}: {err}"
            );
        }
    }

    fn test_datasource() -> Option<String> {
        std::env::var("DAO_TEST_DATASOURCE").ok()
    }

    #[tokio::test]
    #[ignore = "requires MySQL (DAO_TEST_DATASOURCE)"]
    async fn test_bootstrap_is_idempotent() {
        let ds = test_datasource().expect("DAO_TEST_DATASOURCE required");

        for _ in 0..2 {
            let mut db = Database::connect(mysql_config(&ds)).await.unwrap();
            let (one,): (i64,) = sqlx::query_as("SELECT 1")
                .fetch_one(db.pool().unwrap())
                .await
                .unwrap();
            assert_eq!(one, 1);
            db.close().await.unwrap();
        }
    }

    #[tokio::test]
    #[ignore = "requires MySQL (DAO_TEST_DATASOURCE)"]
    async fn test_close_twice_is_an_error() {
        let ds = test_datasource().expect("DAO_TEST_DATASOURCE required");
        let mut db = Database::connect(mysql_config(&ds)).await.unwrap();

        db.close().await.unwrap();
        assert_eq!(db.state(), ConnectionState::Closed);
        assert!(matches!(db.close().await, Err(Error::NotInitialized)));
        assert!(matches!(db.pool(), Err(Error::NotInitialized)));
    }
}
