use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::classify::{ClassifierSettings, DEFAULT_SYSTEM_PROMPT};
use crate::entity::EntityType;
use crate::external::DestinationConfig;
use crate::run::DEFAULT_SUBSCRIBER_BUFFER;

/// Main configuration structure for billing-bridge
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BillingBridgeConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Cohort classification settings
    pub classifier: ClassifierConfig,
    /// Destination ERP settings
    pub destination: DestinationSettings,
    /// Observer fan-out settings
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Classification requests allowed in flight at once
    pub max_concurrency: usize,
    /// Request rate cap; 0 disables rate limiting
    pub requests_per_second: u32,
    pub max_response_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DestinationSettings {
    /// Base URL; the entity path is appended per run
    pub base_url: String,
    /// API key (can be set via NETSUITE_API_KEY)
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Events queued per observer before new ones are dropped for it
    pub subscriber_buffer: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let settings = ClassifierSettings::default();
        Self {
            max_concurrency: settings.max_concurrency,
            requests_per_second: settings.requests_per_second,
            max_response_tokens: settings.max_response_tokens,
            temperature: settings.temperature,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://netsuite.example.com/api".to_string(),
            api_key: None, // Read from env var when absent
        }
    }
}

impl std::fmt::Debug for DestinationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl ClassifierConfig {
    pub fn settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            max_concurrency: self.max_concurrency.max(1),
            requests_per_second: self.requests_per_second,
            max_response_tokens: self.max_response_tokens,
            temperature: self.temperature,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

impl DestinationSettings {
    pub fn for_entity(&self, entity_type: EntityType) -> DestinationConfig {
        DestinationConfig::for_entity(&self.base_url, entity_type, self.api_key.clone())
    }
}

impl BillingBridgeConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (billing-bridge.toml, .billing-bridge-rc)
    /// 3. Environment variables (BILLING_BRIDGE_<SECTION>__<KEY>)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`load`](Self::load) with config files looked up under `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        let toml_path = dir.join("billing-bridge.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".billing-bridge-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("BILLING_BRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut billing_bridge_config: BillingBridgeConfig = config.try_deserialize()?;

        // Destination key may also come from the ERP's conventional variable
        if billing_bridge_config.destination.api_key.is_none() {
            if let Ok(key) = std::env::var("NETSUITE_API_KEY") {
                billing_bridge_config.destination.api_key = Some(key);
            }
        }

        Ok(billing_bridge_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<BillingBridgeConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = BillingBridgeConfig::load_env_file();
        BillingBridgeConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static BillingBridgeConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
