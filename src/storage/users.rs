use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::Tier;
use crate::error::{Error, Result};
use crate::storage::database::from_unix;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub plan: Tier,
    pub credit_balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let plan: String = row.try_get("plan")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            // Unparseable plans from older rows are treated as the entry tier.
            plan: plan.parse().unwrap_or_default(),
            credit_balance: row.try_get("credit_balance")?,
            created_at: from_unix(row.try_get("created_at")?),
            updated_at: from_unix(row.try_get("updated_at")?),
        })
    }
}

/// Repository for user accounts
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with `initial_credits`. Emails are unique.
    pub async fn create(&self, email: &str, name: Option<&str>, initial_credits: i64) -> Result<User> {
        let now = Utc::now().timestamp();
        let id = Uuid::new_v4().to_string();
        let email = email.trim().to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, plan, credit_balance, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(name)
        .bind(Tier::Start.as_str())
        .bind(initial_credits)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::conflict(format!("user with email {} already exists", email))
            }
            other => Error::Database(other),
        })?;

        info!("Created user {} with {} credits", id, initial_credits);
        self.get(&id)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {}", id)))
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<User>> {
        debug!("Loading user {}", user_id);
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(User::from_row).transpose()
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(User::from_row).transpose()
    }

    /// Fetch a user or fail with `NotFound`.
    pub async fn require(&self, user_id: &str) -> Result<User> {
        self.get(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }

    pub async fn set_plan(&self, user_id: &str, plan: Tier) -> Result<()> {
        let rows = sqlx::query("UPDATE users SET plan = ?, updated_at = ? WHERE id = ?")
            .bind(plan.as_str())
            .bind(Utc::now().timestamp())
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(Error::not_found(format!("user {}", user_id)));
        }
        info!("User {} moved to plan {}", user_id, plan);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::create_test_database;

    #[tokio::test]
    async fn test_create_and_fetch() {
        let (db, _dir) = create_test_database().await;
        let repo = UserRepository::new(db.get_pool());

        let user = repo.create("Ann@Example.com", Some("Ann"), 10).await.unwrap();
        assert_eq!(user.email, "ann@example.com");
        assert_eq!(user.plan, Tier::Start);
        assert_eq!(user.credit_balance, 10);

        let by_email = repo.get_by_email("ann@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let (db, _dir) = create_test_database().await;
        let repo = UserRepository::new(db.get_pool());

        repo.create("a@b.co", None, 0).await.unwrap();
        let err = repo.create("A@B.co", None, 0).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_set_plan() {
        let (db, _dir) = create_test_database().await;
        let repo = UserRepository::new(db.get_pool());
        let user = repo.create("p@b.co", None, 0).await.unwrap();

        repo.set_plan(&user.id, Tier::ProStudio).await.unwrap();
        assert_eq!(repo.require(&user.id).await.unwrap().plan, Tier::ProStudio);
        assert!(repo.set_plan("nobody", Tier::Creator).await.is_err());
    }
}
