//! Credential storage

pub mod keyring;

pub use self::keyring::{KeyringError, SecureStorage};
