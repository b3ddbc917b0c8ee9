use std::sync::Arc;
use tracing::info;

use crate::app::config::AppConfig;
use crate::error::Result;
use crate::generation::GenerationService;
use crate::storage::Storage;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    generation: GenerationService,
    storage: Option<Storage>,
}

impl AppState {
    /// Build state from configuration, connecting and migrating storage when
    /// a database URL is set.
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing application state");

        let storage = Storage::from_config(&config.database).await?;
        match storage.as_ref() {
            Some(storage) => {
                let applied = storage.database.run_migrations().await?;
                info!("Storage ready ({} migrations applied)", applied);
            }
            None => info!("No database configured; running without history or ledger"),
        }

        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: AppConfig, storage: Option<Storage>) -> Result<Self> {
        let config = Arc::new(config);
        let generation = GenerationService::new(config.clone(), storage.clone())?;
        Ok(Self {
            config,
            generation,
            storage,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn generation(&self) -> &GenerationService {
        &self.generation
    }

    pub fn storage(&self) -> Result<&Storage> {
        self.generation.storage()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }
}
