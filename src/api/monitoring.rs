use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;
use crate::providers::BreakerSnapshot;
use crate::storage::DatabaseStatistics;

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<DatabaseStatistics>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: StorageHealth,
    pub providers: Vec<BreakerSnapshot>,
    pub tier_gating: bool,
}

/// GET /api/monitoring
///
/// Always answers 200; a broken database shows up as `degraded`.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let mut status = "ok";

    let storage = match state.storage() {
        Ok(storage) => {
            let version = storage.database.get_database_version().await;
            let statistics = storage.database.get_statistics().await;
            if let Err(e) = statistics.as_ref() {
                warn!("Health check could not read database statistics: {}", e);
                status = "degraded";
            }
            StorageHealth {
                configured: true,
                schema_version: version.ok(),
                statistics: statistics.ok(),
            }
        }
        Err(_) => StorageHealth {
            configured: false,
            schema_version: None,
            statistics: None,
        },
    };

    let providers = state.generation().breakers();
    if providers.iter().any(|b| b.state != "closed") {
        status = "degraded";
    }

    Json(Health {
        status,
        version: env!("CARGO_PKG_VERSION"),
        storage,
        providers,
        tier_gating: state.config().access.enforce_tier_gating,
    })
}
