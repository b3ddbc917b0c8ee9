use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::generation::{Feature, TaskStatus};
use crate::storage::database::from_unix;

/// History row for one creative action.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub feature: Feature,
    pub model: String,
    pub prompt: String,
    pub task_id: Option<String>,
    pub status: TaskStatus,
    pub output: Vec<String>,
    pub error: Option<String>,
    pub credit_cost: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGeneration<'a> {
    pub user_id: Option<&'a str>,
    pub feature: Feature,
    pub model: &'a str,
    pub prompt: &'a str,
    pub task_id: Option<&'a str>,
    pub status: TaskStatus,
    pub output: &'a [String],
    pub credit_cost: i64,
}

fn decode_error(msg: String) -> Error {
    Error::Database(sqlx::Error::Decode(msg.into()))
}

impl GenerationRecord {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let feature: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        let output: String = row.try_get("output")?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            feature: Feature::parse(&feature)
                .ok_or_else(|| decode_error(format!("unknown generation kind '{}'", feature)))?,
            model: row.try_get("model")?,
            prompt: row.try_get("prompt")?,
            task_id: row.try_get("task_id")?,
            status: TaskStatus::from_provider(&status)
                .ok_or_else(|| decode_error(format!("unknown generation status '{}'", status)))?,
            output: serde_json::from_str(&output)?,
            error: row.try_get("error")?,
            credit_cost: row.try_get("credit_cost")?,
            created_at: from_unix(row.try_get("created_at")?),
            updated_at: from_unix(row.try_get("updated_at")?),
        })
    }
}

/// Repository for the generation history
pub struct GenerationRepository {
    pool: SqlitePool,
}

impl GenerationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: &NewGeneration<'_>) -> Result<GenerationRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO generations (
                id, user_id, kind, model, prompt, task_id, status, output, credit_cost, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(new.user_id)
        .bind(new.feature.as_str())
        .bind(new.model)
        .bind(new.prompt)
        .bind(new.task_id)
        .bind(new.status.as_str())
        .bind(serde_json::to_string(new.output)?)
        .bind(new.credit_cost)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::conflict(format!(
                "generation for task {} already recorded",
                new.task_id.unwrap_or_default()
            )),
            other => Error::Database(other),
        })?;

        debug!("Recorded {} generation {}", new.feature, id);
        self.get(&id)
            .await?
            .ok_or_else(|| Error::not_found(format!("generation {}", id)))
    }

    pub async fn get(&self, id: &str) -> Result<Option<GenerationRecord>> {
        let row = sqlx::query("SELECT * FROM generations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(GenerationRecord::from_row).transpose()
    }

    pub async fn get_by_task(&self, task_id: &str) -> Result<Option<GenerationRecord>> {
        let row = sqlx::query("SELECT * FROM generations WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(GenerationRecord::from_row).transpose()
    }

    /// Record a status change for a task that has not reached a terminal state
    /// yet. Returns `false` when the row was already terminal or missing.
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        output: &[String],
        error: Option<&str>,
    ) -> Result<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE generations SET status = ?, output = ?, error = ?, updated_at = ?
            WHERE task_id = ? AND status IN ('starting', 'processing')
            "#,
        )
        .bind(status.as_str())
        .bind(serde_json::to_string(output)?)
        .bind(error)
        .bind(Utc::now().timestamp())
        .bind(task_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 1 && status.is_terminal() {
            info!("Generation for task {} finished as {}", task_id, status);
        }
        Ok(rows == 1)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<GenerationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM generations
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit.unwrap_or(50).clamp(1, 200))
        .bind(offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(GenerationRecord::from_row).collect()
    }
}
