//! # np-config
//!
//! Runtime settings for the portal server.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. the file named by `NGO_PORTAL_CONFIG` (optional)
//! 4. environment variables such as `NGO_PORTAL__BIND_ADDR`
//!
//! Call [`load_dotenv`] before [`Settings::load`] so `.env` entries are
//! visible as environment variables.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Environment variable naming an extra settings file.
pub const CONFIG_PATH_VAR: &str = "NGO_PORTAL_CONFIG";
const ENV_PREFIX: &str = "NGO_PORTAL";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Socket address the HTTP server listens on
    pub bind_addr: String,
    /// Directory holding `members.json`, `events.json`, `media_events.json`
    pub data_dir: PathBuf,
    /// Public root; uploads live in sub-directories and it is served under `/static`
    pub public_dir: PathBuf,
    /// Externally addressable host used when building image URLs
    pub asset_base_url: String,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
    /// Argon2 PHC string of the admin bearer token. Unset disables auth.
    #[serde(deserialize_with = "optional_secret")]
    pub admin_token_hash: Option<SecretString>,
    pub cors_allow_any_origin: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            data_dir: PathBuf::from("./data"),
            public_dir: PathBuf::from("./public"),
            asset_base_url: "http://localhost:8000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            log_format: LogFormat::Pretty,
            admin_token_hash: None,
            cors_allow_any_origin: true,
        }
    }
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|value| !value.trim().is_empty())
        .map(SecretString::from))
}

/// Loads the nearest `.env` into the process environment. Returns its path
/// so the caller can log it once tracing is up. Existing variables win.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Like [`load_dotenv`] for an explicit file.
pub fn load_dotenv_from(path: &Path) -> Option<PathBuf> {
    dotenvy::from_path(path).ok().map(|()| path.to_path_buf())
}

impl Settings {
    /// Loads the optional settings files and the environment.
    pub fn load() -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false));
        if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from TOML text over the built-in defaults.
    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.bind_addr.trim().is_empty() {
            return Err(SettingsError::Invalid("bind_addr must not be empty".into()));
        }
        if !(self.asset_base_url.starts_with("http://") || self.asset_base_url.starts_with("https://")) {
            return Err(SettingsError::Invalid(format!(
                "asset_base_url must be an http(s) URL, got '{}'",
                self.asset_base_url
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(SettingsError::Invalid("max_upload_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn auth_enabled(&self) -> bool {
        self.admin_token_hash.is_some()
    }
}
