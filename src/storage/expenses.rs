use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::generation::Feature;
use crate::storage::database::decimal_helpers;

/// Provider spend caused by one generation.
#[derive(Debug, Clone)]
pub struct NewExpense<'a> {
    pub user_id: Option<&'a str>,
    pub provider: &'a str,
    pub model: &'a str,
    pub feature: Feature,
    pub credits: i64,
    pub cost_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpenseSummary {
    pub provider: String,
    pub feature: String,
    pub count: u64,
    pub credits: i64,
    pub cost_usd: Decimal,
}

pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, expense: &NewExpense<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, user_id, provider, model, kind, credits, cost_usd, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(expense.user_id)
        .bind(expense.provider)
        .bind(expense.model)
        .bind(expense.feature.as_str())
        .bind(expense.credits)
        .bind(expense.cost_usd.to_string())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        debug!(
            "Recorded {} expense on {} ({} USD)",
            expense.feature, expense.provider, expense.cost_usd
        );
        Ok(())
    }

    /// Totals per provider and feature since `since` (all time when `None`).
    pub async fn summary(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ExpenseSummary>> {
        let rows = sqlx::query(
            "SELECT provider, kind, credits, cost_usd FROM expenses WHERE created_at >= ?",
        )
        .bind(since.map(|s| s.timestamp()).unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        // Amounts are stored as text, so sum in Decimal rather than in SQL.
        let mut totals: BTreeMap<(String, String), ExpenseSummary> = BTreeMap::new();
        for row in rows {
            let provider: String = row.try_get("provider")?;
            let feature: String = row.try_get("kind")?;
            let cost = decimal_helpers::string_to_decimal(&row.try_get::<String, _>("cost_usd")?)?;

            let entry = totals
                .entry((provider.clone(), feature.clone()))
                .or_insert_with(|| ExpenseSummary {
                    provider,
                    feature,
                    count: 0,
                    credits: 0,
                    cost_usd: Decimal::ZERO,
                });
            entry.count += 1;
            entry.credits += row.try_get::<i64, _>("credits")?;
            entry.cost_usd += cost;
        }

        Ok(totals.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::create_test_database;

    #[tokio::test]
    async fn test_summary_groups_and_sums() {
        let (db, _dir) = create_test_database().await;
        let repo = ExpenseRepository::new(db.get_pool());

        for cost in ["0.003", "0.003"] {
            repo.record(&NewExpense {
                user_id: None,
                provider: "openrouter",
                model: "black-forest-labs/flux-schnell",
                feature: Feature::Image,
                credits: 1,
                cost_usd: cost.parse().unwrap(),
            })
            .await
            .unwrap();
        }
        repo.record(&NewExpense {
            user_id: None,
            provider: "replicate",
            model: "kwaivgi/kling-v2.1",
            feature: Feature::Video,
            credits: 10,
            cost_usd: Decimal::new(28, 2),
        })
        .await
        .unwrap();

        let summary = repo.summary(None).await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].provider, "openrouter");
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].cost_usd, Decimal::new(6, 3));
        assert_eq!(summary[1].credits, 10);
    }
}
