use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::generation::{PollPolicy, TaskKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub polling: PollingConfig,
    pub access: AccessConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite:data/studio.db`. No URL means no storage.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openrouter: ProviderSettings,
    pub replicate: ProviderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Tighter bound for synchronous image generation.
    pub image_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub stuck_start_seconds: u64,
    pub image: PollSettings,
    pub video: PollSettings,
    pub audio: PollSettings,
    pub avatar: PollSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_polls: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub enforce_tier_gating: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Accept generation requests without `X-User-Id` (no ledger involved).
    pub allow_anonymous: bool,
    pub signup_bonus_credits: i64,
    /// Shared secret expected in `X-Api-Key` on payment webhooks.
    pub lava_webhook_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8787".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openrouter: ProviderSettings {
                api_key: None,
                base_url: "https://openrouter.ai/api".to_string(),
                timeout_seconds: 60,
                image_timeout_seconds: 8,
            },
            replicate: ProviderSettings {
                api_key: None,
                base_url: "https://api.replicate.com".to_string(),
                timeout_seconds: 30,
                image_timeout_seconds: 8,
            },
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_seconds: 30,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            stuck_start_seconds: 45,
            image: PollSettings { interval_ms: 2000, max_polls: 60 },
            video: PollSettings { interval_ms: 3000, max_polls: 180 },
            audio: PollSettings { interval_ms: 2000, max_polls: 90 },
            avatar: PollSettings { interval_ms: 3000, max_polls: 120 },
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: true,
            signup_bonus_credits: 10,
            lava_webhook_key: None,
        }
    }
}

impl PollingConfig {
    pub fn settings(&self, kind: TaskKind) -> PollSettings {
        match kind {
            TaskKind::Image => self.image,
            TaskKind::Video => self.video,
            TaskKind::Audio => self.audio,
            TaskKind::Avatar => self.avatar,
        }
    }

    pub fn policy(&self, kind: TaskKind) -> PollPolicy {
        let settings = self.settings(kind);
        PollPolicy {
            interval: Duration::from_millis(settings.interval_ms),
            max_polls: settings.max_polls,
            stuck_start_after: Duration::from_secs(self.stuck_start_seconds),
        }
    }
}

impl AppConfig {
    /// Layer defaults, an optional TOML file, `STUDIO__*` variables and the
    /// conventional provider variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            info!("Loading configuration from: {:?}", path);
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let mut config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix("STUDIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENROUTER_API_KEY") {
            self.providers.openrouter.api_key = Some(key);
        }
        if let Some(key) = non_empty("REPLICATE_API_TOKEN") {
            self.providers.replicate.api_key = Some(key);
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = non_empty("LAVA_WEBHOOK_KEY") {
            self.billing.lava_webhook_key = Some(key);
        }
        if let Some(flag) = non_empty("ENFORCE_TIER_GATING") {
            self.access.enforce_tier_gating =
                matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind_addr.trim().is_empty() {
            return Err(Error::validation("server.bind_addr must not be empty"));
        }

        for (name, provider) in [
            ("openrouter", &self.providers.openrouter),
            ("replicate", &self.providers.replicate),
        ] {
            url::Url::parse(&provider.base_url).map_err(|e| {
                Error::validation(format!("providers.{}.base_url is invalid: {}", name, e))
            })?;
            if provider.timeout_seconds == 0 || provider.image_timeout_seconds == 0 {
                return Err(Error::validation(format!(
                    "providers.{} timeouts must be positive",
                    name
                )));
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(Error::validation("circuit_breaker.failure_threshold must be positive"));
        }

        for kind in TaskKind::ALL {
            let settings = self.polling.settings(kind);
            if settings.interval_ms == 0 || settings.max_polls == 0 {
                return Err(Error::validation(format!(
                    "polling.{} needs a positive interval and budget",
                    kind
                )));
            }
            let budget_ms = settings.interval_ms.saturating_mul(settings.max_polls as u64);
            if self.polling.stuck_start_seconds.saturating_mul(1000) >= budget_ms {
                return Err(Error::validation(format!(
                    "polling.stuck_start_seconds must be shorter than the {} poll budget",
                    kind
                )));
            }
        }

        if self.billing.signup_bonus_credits < 0 {
            return Err(Error::validation("billing.signup_bonus_credits must not be negative"));
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(config::ConfigError::Message(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.access.enforce_tier_gating);
        assert_eq!(config.providers.openrouter.image_timeout_seconds, 8);
        assert_eq!(config.polling.stuck_start_seconds, 45);
    }

    #[test]
    fn test_policy_per_kind() {
        let config = AppConfig::default();
        let video = config.polling.policy(TaskKind::Video);
        assert_eq!(video.interval, Duration::from_secs(3));
        assert_eq!(video.max_polls, 180);
        assert_eq!(video.stuck_start_after, Duration::from_secs(45));
        assert_eq!(config.polling.policy(TaskKind::Image).max_polls, 60);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", "or-key"),
            ("REPLICATE_API_TOKEN", "  "),
            ("ENFORCE_TIER_GATING", "true"),
            ("DATABASE_URL", "sqlite:studio.db"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.providers.openrouter.api_key.as_deref(), Some("or-key"));
        assert!(config.providers.replicate.api_key.is_none());
        assert!(config.access.enforce_tier_gating);
        assert_eq!(config.database.url.as_deref(), Some("sqlite:studio.db"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.providers.replicate.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.polling.audio.max_polls = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.polling.stuck_start_seconds = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("studio.toml");
        std::fs::write(
            &path,
            "[server]\nbind_addr = \"127.0.0.1:9000\"\n\n[polling.video]\ninterval_ms = 2500\nmax_polls = 100\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.polling.video.interval_ms, 2500);
        assert_eq!(config.polling.audio.max_polls, 90);
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[polling.video]"));
    }
}
