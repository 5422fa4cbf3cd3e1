//! dao-core: configuration-driven MySQL bootstrap.
//!
//! Loads `configs/dao.toml`, connects with retry (optionally over TLS),
//! provisions the database and its tables, and hands back a pooled handle.

pub mod config;
pub mod database;
pub mod dsn;
pub mod error;
pub mod mask;
pub mod retry;
pub mod schema;
pub mod tls;

pub use config::{DatabaseConfig, DriverType, TlsConfig};
pub use database::{Bootstrapper, ConnectionState, Database, PoolLimits};
pub use error::{Error, Result};
pub use mask::mask_credentials;
pub use retry::RetryPolicy;
pub use schema::TableDefinition;
pub use tls::{TlsError, TlsProfile};
