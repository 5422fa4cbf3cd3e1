//! Sample CRUD sequence against the configured database.
//!
//! Recreates `users`, inserts through named and positional statements, and
//! prints every row. The first error aborts the remaining steps.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use dao_core::Database;
use sqlx::MySqlPool;
use tracing::debug;

use crate::named;

const CREATE_USERS: &str = r#"
    CREATE TABLE users (
        id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
        name VARCHAR(50) NOT NULL,
        f1 VARCHAR(50) NOT NULL,
        f2 VARCHAR(50) NOT NULL,
        PRIMARY KEY (id)
    ) ENGINE=InnoDB AUTO_INCREMENT=1 DEFAULT CHARSET=utf8mb4
"#;

const BULK_ROWS: usize = 100;

#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub f1: String,
    pub f2: String,
}

pub async fn run_demo(dir: &Path) -> Result<()> {
    let mut db = Database::open(dir)
        .await
        .context("Failed to open database")?;
    println!("connect db success");

    let outcome = run_sequence(db.pool()?).await;

    if let Err(err) = db.close().await {
        debug!("close after demo: {}", err);
    }
    outcome
}

async fn run_sequence(pool: &MySqlPool) -> Result<()> {
    recreate_users(pool).await?;
    insert_named(pool).await?;
    query_named(pool).await?;

    println!("###########################");
    bulk_insert(pool, BULK_ROWS).await?;
    for user in all_users(pool).await? {
        println!("{:?}", user);
    }
    Ok(())
}

async fn recreate_users(pool: &MySqlPool) -> Result<()> {
    let mut tx = pool.begin().await.context("begin transaction")?;

    let result = sqlx::query("drop table if exists users;")
        .execute(&mut *tx)
        .await
        .context("drop users table")?;
    println!("affected: {}", result.rows_affected());

    sqlx::query(CREATE_USERS)
        .execute(&mut *tx)
        .await
        .context("create users table")?;

    tx.commit().await.context("commit")?;
    Ok(())
}

async fn insert_named(pool: &MySqlPool) -> Result<()> {
    let stmt = named::compile("INSERT INTO users (name, f1, f2) VALUES (:name, :f1, :f2)");
    let args = HashMap::from([
        ("name", "Bin".to_string()),
        ("f1", "Smuth".to_string()),
        ("f2", "bensmith@allblacks.nz".to_string()),
    ]);

    let result = stmt.bind(&args)?.execute(pool).await.context("named insert")?;
    println!("MustExec affected: {}", result.rows_affected());
    Ok(())
}

async fn query_named(pool: &MySqlPool) -> Result<()> {
    let stmt = named::compile("SELECT * FROM users WHERE name=:fn");
    let args = HashMap::from([("fn", "Bin".to_string())]);

    let mut query = sqlx::query_as::<_, User>(&stmt.sql);
    for value in stmt.ordered_args(&args)? {
        query = query.bind(value);
    }

    for user in query.fetch_all(pool).await.context("named query")? {
        println!("{:?}", user);
    }
    Ok(())
}

/// Insert `count` rows in a single transaction
async fn bulk_insert(pool: &MySqlPool, count: usize) -> Result<()> {
    let mut tx = pool.begin().await.context("begin transaction")?;
    for i in 1..=count {
        sqlx::query("INSERT INTO users (name, f1, f2) VALUES (?, ?, ?)")
            .bind(format!("Jason-{}", i))
            .bind(format!("Moiron-{}", i))
            .bind(format!("jmoiron-{}", i))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert row {}", i))?;
    }
    tx.commit().await.context("commit")?;
    Ok(())
}

async fn all_users(pool: &MySqlPool) -> Result<Vec<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users")
        .fetch_all(pool)
        .await
        .context("scan users")
}
