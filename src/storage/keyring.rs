//! Portal password storage in the system keyring

use keyring::Entry;
use thiserror::Error;

const SERVICE_NAME: &str = "ie.electricireland.insights";

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("No password stored for {0}")]
    NotFound(String),
}

/// Passwords keyed by portal username
pub struct SecureStorage {
    service: &'static str,
}

impl SecureStorage {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME,
        }
    }

    pub fn store_password(&self, username: &str, password: &str) -> Result<(), KeyringError> {
        let entry = Entry::new(self.service, username)?;
        entry.set_password(password)?;
        tracing::debug!("Stored portal password for {}", username);
        Ok(())
    }

    pub fn password(&self, username: &str) -> Result<String, KeyringError> {
        let entry = Entry::new(self.service, username)?;
        match entry.get_password() {
            Ok(password) => Ok(password),
            Err(keyring::Error::NoEntry) => Err(KeyringError::NotFound(username.to_string())),
            Err(e) => Err(KeyringError::Keyring(e)),
        }
    }

    pub fn delete_password(&self, username: &str) -> Result<(), KeyringError> {
        let entry = Entry::new(self.service, username)?;
        match entry.delete_credential() {
            Ok(()) => {
                tracing::debug!("Deleted portal password for {}", username);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Err(KeyringError::NotFound(username.to_string())),
            Err(e) => Err(KeyringError::Keyring(e)),
        }
    }

    pub fn has_password(&self, username: &str) -> bool {
        self.password(username).is_ok()
    }
}

impl Default for SecureStorage {
    fn default() -> Self {
        Self::new()
    }
}
