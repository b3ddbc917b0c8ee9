use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::access::Tier;
use crate::error::{Error, Result};
use crate::storage::database::from_unix;
use crate::storage::ledger::grant_in;

#[derive(Debug, Clone, Serialize)]
pub struct GiftCode {
    pub code: String,
    pub credits: i64,
    pub plan: Option<Tier>,
    pub redeemed_by: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GiftCode {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let plan: Option<String> = row.try_get("plan")?;
        let redeemed_at: Option<i64> = row.try_get("redeemed_at")?;
        Ok(Self {
            code: row.try_get("code")?,
            credits: row.try_get("credits")?,
            plan: plan.and_then(|p| p.parse().ok()),
            redeemed_by: row.try_get("redeemed_by")?,
            redeemed_at: redeemed_at.map(from_unix),
            created_at: from_unix(row.try_get("created_at")?),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Redemption {
    pub code: String,
    pub credits: i64,
    pub plan: Option<Tier>,
    pub balance: i64,
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

pub struct GiftCodeRepository {
    pool: SqlitePool,
}

impl GiftCodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, code: &str, credits: i64, plan: Option<Tier>) -> Result<GiftCode> {
        let code = normalize(code);
        if code.is_empty() {
            return Err(Error::validation("gift code must not be empty"));
        }

        sqlx::query("INSERT INTO gift_codes (code, credits, plan, created_at) VALUES (?, ?, ?, ?)")
            .bind(&code)
            .bind(credits)
            .bind(plan.map(|p| p.as_str()))
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    Error::conflict(format!("gift code {} already exists", code))
                }
                other => Error::Database(other),
            })?;

        self.get(&code)
            .await?
            .ok_or_else(|| Error::not_found(format!("gift code {}", code)))
    }

    pub async fn get(&self, code: &str) -> Result<Option<GiftCode>> {
        let row = sqlx::query("SELECT * FROM gift_codes WHERE code = ?")
            .bind(normalize(code))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(GiftCode::from_row).transpose()
    }

    /// Redeem a code for `user_id`. Each code works exactly once.
    pub async fn redeem(&self, code: &str, user_id: &str) -> Result<Redemption> {
        let code = normalize(code);
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE gift_codes SET redeemed_by = ?, redeemed_at = ?
            WHERE code = ? AND redeemed_at IS NULL
            RETURNING credits, plan
            "#,
        )
        .bind(user_id)
        .bind(Utc::now().timestamp())
        .bind(&code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: Option<String> = sqlx::query_scalar("SELECT code FROM gift_codes WHERE code = ?")
                .bind(&code)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => Error::conflict(format!("gift code {} was already redeemed", code)),
                None => Error::not_found(format!("gift code {}", code)),
            });
        };

        let credits: i64 = row.try_get("credits")?;
        let plan: Option<Tier> = row
            .try_get::<Option<String>, _>("plan")?
            .and_then(|p| p.parse().ok());

        let balance = grant_in(&mut *tx, user_id, credits, plan).await?;
        tx.commit().await?;

        info!("Gift code {} redeemed by {}", code, user_id);
        Ok(Redemption { code, credits, plan, balance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::create_test_database;
    use crate::storage::users::UserRepository;

    #[tokio::test]
    async fn test_redeem_once() {
        let (db, _dir) = create_test_database().await;
        let users = UserRepository::new(db.get_pool());
        let codes = GiftCodeRepository::new(db.get_pool());
        let alice = users.create("alice@gift.io", None, 0).await.unwrap();
        let bob = users.create("bob@gift.io", None, 0).await.unwrap();

        codes.create("welcome-50", 50, Some(Tier::Creator)).await.unwrap();

        let redemption = codes.redeem(" Welcome-50 ", &alice.id).await.unwrap();
        assert_eq!(redemption.balance, 50);
        assert_eq!(redemption.plan, Some(Tier::Creator));

        assert!(matches!(codes.redeem("WELCOME-50", &bob.id).await, Err(Error::Conflict(_))));
        assert!(matches!(codes.redeem("nope", &bob.id).await, Err(Error::NotFound(_))));

        let stored = codes.get("welcome-50").await.unwrap().unwrap();
        assert_eq!(stored.redeemed_by.as_deref(), Some(alice.id.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_user_keeps_code_unredeemed() {
        let (db, _dir) = create_test_database().await;
        let codes = GiftCodeRepository::new(db.get_pool());
        codes.create("SPARE", 10, None).await.unwrap();

        assert!(codes.redeem("SPARE", "ghost").await.is_err());
        assert!(codes.get("SPARE").await.unwrap().unwrap().redeemed_at.is_none());
    }
}
