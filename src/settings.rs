//! Account settings and password resolution

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::portal::{Credentials, DEFAULT_BASE_URL};
use crate::storage::{KeyringError, SecureStorage};

pub const APP_DIR_NAME: &str = "ElectricIrelandInsights";
const SETTINGS_FILENAME: &str = "settings.json";

pub const SETTINGS_PATH_ENV: &str = "EI_INSIGHTS_SETTINGS";
pub const USERNAME_ENV: &str = "EI_USERNAME";
pub const PASSWORD_ENV: &str = "EI_PASSWORD";
pub const ACCOUNT_NUMBER_ENV: &str = "EI_ACCOUNT_NUMBER";
pub const BASE_URL_ENV: &str = "EI_BASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalSettings {
    pub username: String,
    pub account_number: String,
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub log_to_file: bool,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            account_number: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_seconds: 30,
            log_to_file: false,
        }
    }
}

impl PortalSettings {
    /// Settings file plus environment overrides
    pub fn load() -> Result<Self> {
        let path = settings_path()?;
        let mut settings = Self::load_from(&path)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// A missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = settings_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        let payload = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, payload).context("Failed to write settings")?;
        Ok(())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(username) = lookup(USERNAME_ENV) {
            self.username = username;
        }
        if let Some(account_number) = lookup(ACCOUNT_NUMBER_ENV) {
            self.account_number = account_number;
        }
        if let Some(base_url) = lookup(BASE_URL_ENV) {
            self.base_url = base_url;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn credentials(&self, password: String) -> Result<Credentials> {
        if self.username.trim().is_empty() {
            bail!("No username configured; run `ei-insights login` or set {}", USERNAME_ENV);
        }
        if self.account_number.trim().is_empty() {
            bail!(
                "No account number configured; run `ei-insights login` or set {}",
                ACCOUNT_NUMBER_ENV
            );
        }

        Ok(Credentials {
            username: self.username.trim().to_string(),
            password,
            account_number: self.account_number.trim().to_string(),
        })
    }
}

pub fn settings_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let data_dir = dirs::data_dir().context("Could not determine data directory")?;
    Ok(data_dir.join(APP_DIR_NAME).join(SETTINGS_FILENAME))
}

/// `EI_PASSWORD`, else the keyring entry for `username`
pub fn resolve_password(username: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    match SecureStorage::new().password(username) {
        Ok(password) => Ok(password),
        Err(KeyringError::NotFound(_)) => bail!(
            "No password for {}; run `ei-insights login` or set {}",
            username,
            PASSWORD_ENV
        ),
        Err(err) => Err(err).context("Failed to read password from keyring"),
    }
}
