// Storage layer for persistent data

pub mod conversations;
pub mod database;
pub mod expenses;
pub mod generations;
pub mod gift_codes;
pub mod ledger;
pub mod payments;
pub mod users;

pub use conversations::{Conversation, ConversationRepository, StoredMessage};
pub use database::{decimal_helpers, Database, DatabaseStatistics};
pub use expenses::{ExpenseRepository, ExpenseSummary, NewExpense};
pub use generations::{GenerationRecord, GenerationRepository, NewGeneration};
pub use gift_codes::{GiftCode, GiftCodeRepository, Redemption};
pub use ledger::{CreditLedger, Reservation, ReservationStatus};
pub use payments::{Payment, PaymentGrant, PaymentOutcome, PaymentRepository, PaymentStatus};
pub use users::{User, UserRepository};

use std::sync::Arc;

use crate::app::config::DatabaseConfig;
use crate::error::Result;

/// Every repository over one pool.
#[derive(Clone)]
pub struct Storage {
    pub database: Database,
    pub users: Arc<UserRepository>,
    pub generations: Arc<GenerationRepository>,
    pub ledger: CreditLedger,
    pub payments: Arc<PaymentRepository>,
    pub gift_codes: Arc<GiftCodeRepository>,
    pub expenses: Arc<ExpenseRepository>,
    pub conversations: Arc<ConversationRepository>,
}

impl Storage {
    pub fn new(database: Database) -> Self {
        let pool = database.get_pool();
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            generations: Arc::new(GenerationRepository::new(pool.clone())),
            ledger: CreditLedger::new(pool.clone()),
            payments: Arc::new(PaymentRepository::new(pool.clone())),
            gift_codes: Arc::new(GiftCodeRepository::new(pool.clone())),
            expenses: Arc::new(ExpenseRepository::new(pool.clone())),
            conversations: Arc::new(ConversationRepository::new(pool)),
            database,
        }
    }

    /// Connect using the configured URL; `None` when no database is configured.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Option<Self>> {
        match config.url.as_deref() {
            Some(url) => {
                let database = Database::connect(url, config.max_connections).await?;
                Ok(Some(Self::new(database)))
            }
            None => Ok(None),
        }
    }
}
