//! Credential storage for the access/refresh token pair.
//!
//! Uses the `keyring` crate so tokens live in the platform keychain and survive
//! restarts. Exactly one pair is stored per device, under two fixed entry names.

use keyring::Entry;
use thiserror::Error;

/// Keychain entry name for the short-lived access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Keychain entry name for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("Keychain operation failed: {0}")]
    OperationFailed(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        KeychainError::OperationFailed(err.to_string())
    }
}

/// Which half of the credential pair an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 2] = [TokenKind::Access, TokenKind::Refresh];

    /// Well-known key the token is stored under.
    pub fn key(self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_TOKEN_KEY,
            TokenKind::Refresh => REFRESH_TOKEN_KEY,
        }
    }
}

/// Durable key-value store holding the credential pair.
///
/// Shared process-wide; writers are the refresh step (access token only) and
/// the login/logout flows. Last writer wins.
pub trait CredentialStore: Send + Sync {
    /// Returns `None` if the entry was never written or has been deleted.
    fn get(&self, kind: TokenKind) -> Result<Option<String>, KeychainError>;

    fn set(&self, kind: TokenKind, token: &str) -> Result<(), KeychainError>;

    /// Idempotent: deleting a missing entry succeeds.
    fn delete(&self, kind: TokenKind) -> Result<(), KeychainError>;
}

/// Platform keychain backed store.
pub struct KeychainStore {
    service: String,
}

impl KeychainStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, kind: TokenKind) -> Result<Entry, KeychainError> {
        Ok(Entry::new(&self.service, kind.key())?)
    }
}

impl CredentialStore for KeychainStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>, KeychainError> {
        match self.entry(kind)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeychainError::from(e)),
        }
    }

    fn set(&self, kind: TokenKind, token: &str) -> Result<(), KeychainError> {
        self.entry(kind)?.set_password(token)?;
        Ok(())
    }

    fn delete(&self, kind: TokenKind) -> Result<(), KeychainError> {
        match self.entry(kind)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted, idempotent
            Err(e) => Err(KeychainError::from(e)),
        }
    }
}
