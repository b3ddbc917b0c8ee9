//! Payments and idempotent webhook crediting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::Tier;
use crate::error::{Error, Result};
use crate::storage::database::from_unix;
use crate::storage::ledger::grant_in;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: String,
    pub user_id: Option<String>,
    pub provider: String,
    pub provider_order_id: String,
    pub package_id: String,
    pub amount_rub: i64,
    pub credits: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let completed_at: Option<i64> = row.try_get("completed_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            provider: row.try_get("provider")?,
            provider_order_id: row.try_get("provider_order_id")?,
            package_id: row.try_get("package_id")?,
            amount_rub: row.try_get("amount_rub")?,
            credits: row.try_get("credits")?,
            status: if status == "completed" {
                PaymentStatus::Completed
            } else {
                PaymentStatus::Pending
            },
            created_at: from_unix(row.try_get("created_at")?),
            completed_at: completed_at.map(from_unix),
        })
    }
}

/// What a successful payment is worth.
#[derive(Debug, Clone)]
pub struct PaymentGrant<'a> {
    pub user_id: Option<&'a str>,
    pub package_id: &'a str,
    pub amount_rub: i64,
    pub credits: i64,
    pub plan: Option<Tier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Credited { user_id: String, credits: i64, balance: i64 },
    /// The order was already completed by an earlier delivery.
    Duplicate,
}

pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a checkout intent.
    pub async fn create_pending(
        &self,
        provider: &str,
        provider_order_id: &str,
        grant: &PaymentGrant<'_>,
    ) -> Result<Payment> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO payments (id, user_id, provider, provider_order_id, package_id, amount_rub, credits, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&id)
        .bind(grant.user_id)
        .bind(provider)
        .bind(provider_order_id)
        .bind(grant.package_id)
        .bind(grant.amount_rub)
        .bind(grant.credits)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::conflict(format!("order {} already exists", provider_order_id))
            }
            other => Error::Database(other),
        })?;

        info!("Created pending {} payment {} for order {}", provider, id, provider_order_id);
        self.get(provider, provider_order_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("payment {}", id)))
    }

    pub async fn get(&self, provider: &str, provider_order_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE provider = ? AND provider_order_id = ?")
            .bind(provider)
            .bind(provider_order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Payment::from_row).transpose()
    }

    /// Complete an order and credit the user in one transaction.
    ///
    /// The payment row is inserted if checkout never created it, then moved
    /// from `pending` to `completed`. Credits are granted only by the call that
    /// performs that move, so repeated deliveries of the same order are no-ops.
    pub async fn complete_and_grant(
        &self,
        provider: &str,
        provider_order_id: &str,
        grant: &PaymentGrant<'_>,
    ) -> Result<PaymentOutcome> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO payments (id, user_id, provider, provider_order_id, package_id, amount_rub, credits, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(grant.user_id)
        .bind(provider)
        .bind(provider_order_id)
        .bind(grant.package_id)
        .bind(grant.amount_rub)
        .bind(grant.credits)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            UPDATE payments SET status = 'completed', completed_at = ?
            WHERE provider = ? AND provider_order_id = ? AND status = 'pending'
            RETURNING user_id, package_id, credits
            "#,
        )
        .bind(now)
        .bind(provider)
        .bind(provider_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            debug!("Order {}/{} already completed", provider, provider_order_id);
            return Ok(PaymentOutcome::Duplicate);
        };

        let stored_package: String = row.try_get("package_id")?;
        if stored_package != grant.package_id {
            warn!(
                "Order {}/{} was created for package {} but paid as {}",
                provider, provider_order_id, stored_package, grant.package_id
            );
            return Err(Error::conflict(format!(
                "order {} belongs to package {}",
                provider_order_id, stored_package
            )));
        }

        let stored_user: Option<String> = row.try_get("user_id")?;
        let user_id = stored_user
            .or_else(|| grant.user_id.map(str::to_string))
            .ok_or_else(|| Error::validation("payment has no user to credit"))?;
        let credits: i64 = row.try_get("credits")?;

        let balance = grant_in(&mut *tx, &user_id, credits, grant.plan).await?;
        tx.commit().await?;

        info!(
            "Order {}/{} completed: {} credits to {}",
            provider, provider_order_id, credits, user_id
        );
        Ok(PaymentOutcome::Credited { user_id, credits, balance })
    }
}
