//! Server-side credit ledger.
//!
//! Credits are taken from the balance when a reservation is made and the
//! reservation is then either confirmed (spent) or released (refunded). Both
//! transitions only fire from `reserved`, so repeating them is harmless.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::Tier;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Confirmed,
    Released,
}

impl ReservationStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(Self::Reserved),
            "confirmed" => Some(Self::Confirmed),
            "released" => Some(Self::Released),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct CreditLedger {
    pool: SqlitePool,
}

impl CreditLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        let balance: Option<i64> = sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        balance.ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }

    /// Take `amount` credits off the balance and hold them under a new reservation.
    pub async fn reserve(&self, user_id: &str, amount: i64) -> Result<Reservation> {
        if amount < 0 {
            return Err(Error::validation("reservation amount must not be negative"));
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            "UPDATE users SET credit_balance = credit_balance - ?, updated_at = ? WHERE id = ? AND credit_balance >= ?",
        )
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if debited == 0 {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = ?")
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match available {
                None => Error::not_found(format!("user {}", user_id)),
                Some(available) => Error::InsufficientCredits { required: amount, available },
            });
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO credit_reservations (id, user_id, amount, status, created_at, updated_at)
            VALUES (?, ?, ?, 'reserved', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Reserved {} credits for {} ({})", amount, user_id, id);

        Ok(Reservation {
            id,
            user_id: user_id.to_string(),
            amount,
        })
    }

    /// Bind a reservation to the provider task it pays for.
    pub async fn attach_task(&self, reservation_id: &str, task_id: &str) -> Result<()> {
        let rows = sqlx::query(
            "UPDATE credit_reservations SET task_id = ?, updated_at = ? WHERE id = ? AND status = 'reserved'",
        )
        .bind(task_id)
        .bind(Utc::now().timestamp())
        .bind(reservation_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(Error::conflict(format!(
                "reservation {} is not open",
                reservation_id
            )));
        }
        Ok(())
    }

    /// Mark the credits as spent. Returns whether this call did the transition.
    pub async fn confirm(&self, reservation_id: &str) -> Result<bool> {
        let rows = sqlx::query(
            "UPDATE credit_reservations SET status = 'confirmed', updated_at = ? WHERE id = ? AND status = 'reserved'",
        )
        .bind(Utc::now().timestamp())
        .bind(reservation_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 1 {
            debug!("Confirmed reservation {}", reservation_id);
        }
        Ok(rows == 1)
    }

    /// Refund the held credits. Refunds at most once per reservation.
    pub async fn release(&self, reservation_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        let row = sqlx::query(
            "UPDATE credit_reservations SET status = 'released', updated_at = ? WHERE id = ? AND status = 'reserved' RETURNING user_id, amount",
        )
        .bind(now)
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };

        let user_id: String = row.try_get("user_id")?;
        let amount: i64 = row.try_get("amount")?;
        sqlx::query("UPDATE users SET credit_balance = credit_balance + ?, updated_at = ? WHERE id = ?")
            .bind(amount)
            .bind(now)
            .bind(&user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Released {} credits back to {} ({})", amount, user_id, reservation_id);
        Ok(true)
    }

    async fn reservation_for_task(&self, task_id: &str) -> Result<Option<String>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM credit_reservations WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    /// `confirm` by task id. Tasks without a reservation (anonymous) are a no-op.
    pub async fn confirm_task(&self, task_id: &str) -> Result<bool> {
        match self.reservation_for_task(task_id).await? {
            Some(id) => self.confirm(&id).await,
            None => Ok(false),
        }
    }

    /// `release` by task id. Tasks without a reservation (anonymous) are a no-op.
    pub async fn release_task(&self, task_id: &str) -> Result<bool> {
        match self.reservation_for_task(task_id).await? {
            Some(id) => self.release(&id).await,
            None => Ok(false),
        }
    }

    pub async fn status(&self, reservation_id: &str) -> Result<ReservationStatus> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM credit_reservations WHERE id = ?")
                .bind(reservation_id)
                .fetch_optional(&self.pool)
                .await?;

        let status = status.ok_or_else(|| Error::not_found(format!("reservation {}", reservation_id)))?;
        ReservationStatus::parse(&status).ok_or_else(|| {
            Error::Database(sqlx::Error::Decode(
                format!("unknown reservation status '{}'", status).into(),
            ))
        })
    }

    /// Add credits outside of a payment flow.
    pub async fn grant(&self, user_id: &str, credits: i64, plan: Option<Tier>) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let balance = grant_in(&mut *tx, user_id, credits, plan).await?;
        tx.commit().await?;
        Ok(balance)
    }
}

/// Add `credits` and raise the plan to `plan` if it is higher, on an open
/// connection or transaction. Returns the new balance.
pub(crate) async fn grant_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    credits: i64,
    plan: Option<Tier>,
) -> Result<i64> {
    if credits < 0 {
        return Err(Error::validation("granted credits must not be negative"));
    }

    let row = sqlx::query("SELECT plan, credit_balance FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::not_found(format!("user {}", user_id)))?;

    let current_plan: Tier = row
        .try_get::<String, _>("plan")?
        .parse()
        .unwrap_or_default();
    let new_plan = match plan {
        Some(plan) if plan > current_plan => plan,
        Some(plan) => {
            if plan < current_plan {
                warn!("Not downgrading {} from {} to {}", user_id, current_plan, plan);
            }
            current_plan
        }
        None => current_plan,
    };

    let balance: i64 = sqlx::query_scalar(
        "UPDATE users SET credit_balance = credit_balance + ?, plan = ?, updated_at = ? WHERE id = ? RETURNING credit_balance",
    )
    .bind(credits)
    .bind(new_plan.as_str())
    .bind(Utc::now().timestamp())
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    info!("Granted {} credits to {} (plan {})", credits, user_id, new_plan);
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::create_test_database;
    use crate::storage::users::UserRepository;

    async fn setup(credits: i64) -> (CreditLedger, String, tempfile::TempDir) {
        let (db, dir) = create_test_database().await;
        let user = UserRepository::new(db.get_pool())
            .create("ledger@test.io", None, credits)
            .await
            .unwrap();
        (CreditLedger::new(db.get_pool()), user.id, dir)
    }

    #[tokio::test]
    async fn test_reserve_and_confirm() {
        let (ledger, user, _dir) = setup(10).await;

        let reservation = ledger.reserve(&user, 4).await.unwrap();
        assert_eq!(ledger.balance(&user).await.unwrap(), 6);

        assert!(ledger.confirm(&reservation.id).await.unwrap());
        assert!(!ledger.confirm(&reservation.id).await.unwrap());
        assert!(!ledger.release(&reservation.id).await.unwrap());
        assert_eq!(ledger.balance(&user).await.unwrap(), 6);
        assert_eq!(ledger.status(&reservation.id).await.unwrap(), ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_release_refunds_once() {
        let (ledger, user, _dir) = setup(10).await;

        let reservation = ledger.reserve(&user, 10).await.unwrap();
        assert_eq!(ledger.balance(&user).await.unwrap(), 0);

        assert!(ledger.release(&reservation.id).await.unwrap());
        assert!(!ledger.release(&reservation.id).await.unwrap());
        assert_eq!(ledger.balance(&user).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_insufficient_credits_never_goes_negative() {
        let (ledger, user, _dir) = setup(3).await;

        let err = ledger.reserve(&user, 5).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientCredits { required: 5, available: 3 }));
        assert_eq!(ledger.balance(&user).await.unwrap(), 3);

        assert!(matches!(ledger.reserve("ghost", 1).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_serialize() {
        let (ledger, user, _dir) = setup(5).await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let ledger = ledger.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move { ledger.reserve(&user, 2).await }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 2);
        assert_eq!(ledger.balance(&user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_task_scoped_transitions() {
        let (ledger, user, _dir) = setup(20).await;

        let reservation = ledger.reserve(&user, 10).await.unwrap();
        ledger.attach_task(&reservation.id, "pred-1").await.unwrap();

        assert!(ledger.release_task("pred-1").await.unwrap());
        assert!(!ledger.confirm_task("pred-1").await.unwrap());
        assert!(!ledger.release_task("unknown-task").await.unwrap());
        assert_eq!(ledger.balance(&user).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_grant_never_downgrades() {
        let (ledger, user, _dir) = setup(0).await;

        assert_eq!(ledger.grant(&user, 100, Some(Tier::ProStudio)).await.unwrap(), 100);
        assert_eq!(ledger.grant(&user, 50, Some(Tier::Creator)).await.unwrap(), 150);

        let plan: String = sqlx::query_scalar("SELECT plan FROM users WHERE id = ?")
            .bind(&user)
            .fetch_one(&ledger.pool)
            .await
            .unwrap();
        assert_eq!(plan, "pro_studio");
    }
}
