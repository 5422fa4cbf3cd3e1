//! Idempotent provisioning statements.
//!
//! Every statement here is safe to run on every startup.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Executor, MySql};
use tracing::{debug, info};

use crate::error::{Error, Result};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-zA-Z$_-]{1,64}$").expect("identifier regex"));

/// One `CREATE TABLE IF NOT EXISTS` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub ddl: String,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, ddl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ddl: ddl.into(),
        }
    }
}

/// Tables provisioned by default: the `users` table the demo works with
pub fn default_tables() -> Vec<TableDefinition> {
    vec![TableDefinition::new(
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
            name VARCHAR(50) NOT NULL,
            f1 VARCHAR(50) NOT NULL,
            f2 VARCHAR(50) NOT NULL,
            PRIMARY KEY (id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )]
}

/// Backtick-quote a database name after checking its characters
pub fn quote_identifier(name: &str) -> Result<String> {
    if !IDENTIFIER_RE.is_match(name) {
        return Err(Error::schema(format!("invalid database name '{}'", name)));
    }
    Ok(format!("`{}`", name))
}

pub fn create_database_sql(name: &str) -> Result<String> {
    Ok(format!("CREATE DATABASE IF NOT EXISTS {}", quote_identifier(name)?))
}

/// Create the database if it does not exist
pub async fn create_database<'e, E>(executor: E, name: &str) -> Result<()>
where
    E: Executor<'e, Database = MySql>,
{
    let sql = create_database_sql(name)?;
    debug!("Creating MySQL database ({}) if it does not exist", name);

    executor
        .execute(sql.as_str())
        .await
        .map_err(|e| Error::schema_with("Failed to execute create database query", e))?;
    Ok(())
}

/// Run each table statement in order
pub async fn create_tables<'e, E>(executor: E, tables: &[TableDefinition]) -> Result<()>
where
    E: Executor<'e, Database = MySql> + Copy,
{
    for table in tables {
        debug!("Creating {} table if it doesn't exist", table.name);
        executor
            .execute(table.ddl.as_str())
            .await
            .map_err(|e| Error::schema_with(format!("Error creating {} table", table.name), e))?;
    }
    if !tables.is_empty() {
        info!("Provisioned {} table(s)", tables.len());
    }
    Ok(())
}
