use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// Schema migrations, compiled into the binary. Numbered from 1.
const MIGRATIONS: &[(i32, &str, &str)] = &[(
    1,
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Database connection manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to `url`, creating the file if needed, and run pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        info!("Initializing database at: {}", url);

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Database initialized successfully");
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn get_pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Apply every embedded migration newer than the recorded version.
    pub async fn run_migrations(&self) -> Result<u32> {
        let current_version = self.get_database_version().await?;
        debug!("Current database version: {}", current_version);

        let mut applied = 0;
        for (number, name, sql) in MIGRATIONS {
            if *number <= current_version {
                debug!("Skipping migration {} (already applied)", name);
                continue;
            }

            info!("Applying migration: {}", name);
            let mut tx = self.pool.begin().await?;
            sqlx::query(sql).execute(&mut *tx).await.map_err(|e| {
                error!("Failed to apply migration {}: {}", name, e);
                Error::Database(e)
            })?;
            sqlx::query(
                "INSERT OR REPLACE INTO app_settings (key, value, updated_at) VALUES ('database_version', ?, unixepoch())",
            )
            .bind(number.to_string())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            applied += 1;
            info!("Successfully applied migration: {}", name);
        }

        Ok(applied)
    }

    pub async fn get_database_version(&self) -> Result<i32> {
        let table_exists = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='app_settings'",
        )
        .fetch_optional(&self.pool)
        .await?
        .is_some();

        if !table_exists {
            return Ok(0);
        }

        let version: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = 'database_version'")
                .fetch_optional(&self.pool)
                .await?;

        match version {
            Some(version_str) => version_str.parse().map_err(|e| {
                Error::Database(sqlx::Error::Decode(
                    format!("Invalid database version: {}", e).into(),
                ))
            }),
            None => Ok(0),
        }
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    /// Row counts for the monitoring endpoint.
    pub async fn get_statistics(&self) -> Result<DatabaseStatistics> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            async move {
                sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                    .fetch_one(&pool)
                    .await
                    .map(|n| n as u64)
            }
        };

        Ok(DatabaseStatistics {
            users_count: count("users").await?,
            generations_count: count("generations").await?,
            payments_count: count("payments").await?,
            conversations_count: count("conversations").await?,
            messages_count: count("chat_messages").await?,
            database_size_bytes: self.get_database_size().await?,
        })
    }

    async fn get_database_size(&self) -> Result<u64> {
        let size: Option<i64> = sqlx::query_scalar(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(size.unwrap_or(0) as u64)
    }

    pub async fn verify_integrity(&self) -> Result<bool> {
        let result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        let is_ok = result == "ok";
        if !is_ok {
            error!("Database integrity check failed: {}", result);
        }
        Ok(is_ok)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatistics {
    pub users_count: u64,
    pub generations_count: u64,
    pub payments_count: u64,
    pub conversations_count: u64,
    pub messages_count: u64,
    pub database_size_bytes: u64,
}

/// Helpers for storing `Decimal` amounts as text.
pub mod decimal_helpers {
    use crate::error::{Error, Result};
    use rust_decimal::Decimal;

    pub fn string_to_decimal(s: &str) -> Result<Decimal> {
        s.parse().map_err(|e| {
            Error::Database(sqlx::Error::Decode(
                format!("Failed to parse decimal from string '{}': {}", s, e).into(),
            ))
        })
    }
}

/// Unix seconds back to a timestamp, falling back to now for corrupt rows.
pub(crate) fn from_unix(ts: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts, 0).unwrap_or_else(chrono::Utc::now)
}


#[cfg(test)]
mod tests {
    use super::test_support::create_test_database;
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_database_creation() {
        let (db, _temp_dir) = create_test_database().await;

        let stats = db.get_statistics().await.unwrap();
        assert_eq!(stats.users_count, 0);
        assert_eq!(stats.generations_count, 0);
        assert_eq!(db.get_database_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_migrations_are_not_reapplied() {
        let (db, _temp_dir) = create_test_database().await;
        assert_eq!(db.run_migrations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_database_integrity() {
        let (db, _temp_dir) = create_test_database().await;
        assert!(db.verify_integrity().await.unwrap());
    }

    #[test]
    fn test_decimal_helpers() {
        let parsed = decimal_helpers::string_to_decimal("123.45").unwrap();
        assert_eq!(parsed, Decimal::new(12345, 2));
        assert!(decimal_helpers::string_to_decimal("abc").is_err());
    }
}
