use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path};
use url::Url;

const WEBHOOK_PATH: &str = "api/webhook/email/";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub default_user_id: String,
    pub webhook_base_url: String,
    pub sync_max_results: u32,
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub request_timeout_secs: u64,
    /// Budget for `/api/sync`, which waits on a connector fetch before ingesting
    pub sync_timeout_secs: u64,
    pub cors_origins: Vec<String>,
}

impl Settings {
    /// Callback URL registered with the connector's new-message trigger
    pub fn webhook_url(&self) -> String {
        format!("{}/{}", self.webhook_base_url.trim_end_matches('/'), WEBHOOK_PATH)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComposioSettings {
    pub base_url: String,
    pub app_name: String,
    pub new_message_trigger: String,
    pub fetch_emails_action: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    settings: Settings,
    composio: ComposioSettings,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub settings: Settings,
    pub composio: ComposioSettings,
    pub api_key: String,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked_key = if self.api_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };

        write!(
            f,
            "Server Config:\n{:?}\n\nComposio: {:?}\n\nAPI key: {}\n\nWebhook URL: {}",
            self.settings,
            self.composio,
            masked_key,
            self.settings.webhook_url(),
        )
    }
}

fn config_dir() -> String {
    env::var("APP_DIR").unwrap_or_else(|_| {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .map(|parent| parent.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        format!("{}/config", dir)
    })
}

impl ServerConfig {
    /// Reads `config.toml`, then applies `APP__SECTION__KEY` and the documented plain
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = format!("{}/config.toml", config_dir());
        let file: ConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        let mut settings = file.settings;
        if let Ok(base_url) = env::var("WEBHOOK_BASE_URL") {
            settings.webhook_base_url = base_url;
        }

        validate(&settings, &file.composio)?;

        let api_key = env::var("COMPOSIO_API_KEY").unwrap_or_else(|_| {
            tracing::warn!("COMPOSIO_API_KEY is not set, connector calls will be rejected");
            String::new()
        });

        Ok(ServerConfig {
            settings,
            composio: file.composio,
            api_key,
        })
    }
}

fn validate(settings: &Settings, composio: &ComposioSettings) -> Result<(), ConfigError> {
    Url::parse(&settings.webhook_base_url).map_err(|e| {
        ConfigError::Message(format!(
            "Invalid webhook base url {}: {}",
            settings.webhook_base_url, e
        ))
    })?;
    Url::parse(&composio.base_url).map_err(|e| {
        ConfigError::Message(format!(
            "Invalid composio base url {}: {}",
            composio.base_url, e
        ))
    })?;

    if settings.max_page_size == 0 {
        return Err(ConfigError::Message(
            "max_page_size must be at least 1".to_string(),
        ));
    }

    // A sync must outlive the connector fetch it waits on
    if settings.sync_timeout_secs <= composio.timeout_secs {
        return Err(ConfigError::Message(format!(
            "sync_timeout_secs ({}) must exceed composio.timeout_secs ({})",
            settings.sync_timeout_secs, composio.timeout_secs
        )));
    }

    Ok(())
}

lazy_static! {
    pub static ref cfg: ServerConfig = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => panic!("Failed to load server config: {e}"),
    };
}
