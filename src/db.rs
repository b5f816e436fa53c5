use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::{ConfigError, DbConfig, Destination};
use crate::models::ProductRecord;

/// A table that can be refreshed wholesale with a new set of records.
#[async_trait]
pub trait TableWriter: Send + Sync {
    /// Drop whatever `table` holds and write exactly `records`.
    /// Returns the number of rows written.
    async fn replace_products(&self, table: &str, records: &[ProductRecord]) -> Result<usize>;
}

/// Open the writer for a destination. For Postgres this is where missing
/// credentials surface.
pub async fn open_writer(destination: &Destination) -> Result<Box<dyn TableWriter>> {
    info!("Connecting to {}", destination.describe());
    Ok(match destination {
        Destination::Postgres(cfg) => Box::new(PostgresWriter::connect(cfg).await?),
        Destination::Sqlite(path) => Box::new(SqliteWriter::new(path)),
    })
}

fn quote_ident(name: &str) -> Result<String, ConfigError> {
    if name.is_empty() || name.contains('"') || name.contains('\0') {
        return Err(ConfigError::InvalidTableName(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

// ── Postgres ──

pub struct PostgresWriter {
    pool: PgPool,
}

impl PostgresWriter {
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let url = cfg.connection_url()?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .with_context(|| format!("Failed to connect to {}", cfg.redacted()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl TableWriter for PostgresWriter {
    async fn replace_products(&self, table: &str, records: &[ProductRecord]) -> Result<usize> {
        let table = quote_ident(table)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {} (
                name    TEXT,
                code    BIGINT,
                price   DOUBLE PRECISION,
                country TEXT
            )",
            table
        ))
        .execute(&mut *tx)
        .await?;

        let insert = format!(
            "INSERT INTO {} (name, code, price, country) VALUES ($1, $2, $3, $4)",
            table
        );
        for r in records {
            sqlx::query(&insert)
                .bind(r.name.as_str())
                .bind(r.code)
                .bind(r.price)
                .bind(r.country.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }
}

// ── SQLite ──

pub struct SqliteWriter {
    path: PathBuf,
}

impl SqliteWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.path)
    }

    #[cfg(test)]
    pub fn row_count(&self, table: &str) -> Result<usize> {
        let conn = self.connect()?;
        let n = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)?),
            [],
            |r| r.get(0),
        )?;
        Ok(n)
    }
}

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

#[async_trait]
impl TableWriter for SqliteWriter {
    async fn replace_products(&self, table: &str, records: &[ProductRecord]) -> Result<usize> {
        let table = quote_ident(table)?;
        let conn = self.connect()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                 name    TEXT,
                 code    INTEGER,
                 price   REAL,
                 country TEXT
             );"
        ))?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (name, code, price, country) VALUES (?1, ?2, ?3, ?4)",
                table
            ))?;
            for r in records {
                count += stmt.execute(rusqlite::params![r.name, r.code, r.price, r.country])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }
}
