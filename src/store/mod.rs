//! Credential persistence behind one backend-uniform contract.
//!
//! Physical backends differ in identity scheme (Mongo surrogate `_id`,
//! externally issued UUIDs in the key-value store, provider-managed UIDs)
//! and in how a lookup miss is signaled. The contract normalizes all of
//! that: misses are `Ok(None)`, uniqueness violations are `DuplicateKey`,
//! transport failures are `Upstream`. Callers never branch on the backend.

pub mod memory;
pub mod mongo;
pub mod provider;
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::info;

/// One credential record per principal. The only place secret material
/// (password hash, MFA secret, refresh token) is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub principal_id: String,
    pub email: String,
    pub password_hash: String,
    pub mfa_secret: String,
    pub mfa_enabled: bool,
    pub mfa_verified: bool,
    pub refresh_token: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Material for a credential that does not exist yet. The backend assigns
/// the principal id and the timestamps.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub email: String,
    pub password_hash: String,
}

/// Partial field update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub principal_id: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub mfa_secret: Option<String>,
    pub mfa_enabled: Option<bool>,
    pub mfa_verified: Option<bool>,
    pub refresh_token: Option<String>,
}

impl CredentialUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.mfa_secret.is_none()
            && self.mfa_enabled.is_none()
            && self.mfa_verified.is_none()
            && self.refresh_token.is_none()
    }
}

impl Credential {
    /// Apply a partial update in place, returning whether anything changed.
    /// `updated_at` is only touched when a field actually changed.
    pub fn apply(&mut self, update: &CredentialUpdate) -> bool {
        let mut changed = false;

        if let Some(email) = &update.email {
            if *email != self.email {
                self.email = email.clone();
                changed = true;
            }
        }
        if let Some(hash) = &update.password_hash {
            if *hash != self.password_hash {
                self.password_hash = hash.clone();
                changed = true;
            }
        }
        if let Some(secret) = &update.mfa_secret {
            if *secret != self.mfa_secret {
                self.mfa_secret = secret.clone();
                changed = true;
            }
        }
        if let Some(enabled) = update.mfa_enabled {
            if enabled != self.mfa_enabled {
                self.mfa_enabled = enabled;
                changed = true;
            }
        }
        if let Some(verified) = update.mfa_verified {
            if verified != self.mfa_verified {
                self.mfa_verified = verified;
                changed = true;
            }
        }
        if let Some(token) = &update.refresh_token {
            if self.refresh_token.as_deref() != Some(token.as_str()) {
                self.refresh_token = Some(token.clone());
                changed = true;
            }
        }

        if changed {
            self.updated_at = unix_now();
        }

        changed
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateKey,
    #[error("credential not found")]
    NotFound,
    #[error("update matched a credential but changed nothing")]
    NoOpUpdate,
    #[error("backend does not support {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// The five-operation contract every backend satisfies.
///
/// Backend clients are long-lived, acquired once at process start, and safe
/// for concurrent use; implementations add no locking of their own.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a new credential, assigning identity and timestamps.
    async fn save(&self, new: NewCredential) -> Result<Credential, StoreError>;

    async fn find_by_principal_id(&self, id: &str) -> Result<Option<Credential>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError>;

    /// Partial update. `NotFound` when nothing matched, `NoOpUpdate` when a
    /// record matched but no field changed.
    async fn update(&self, update: CredentialUpdate) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Skip/limit pagination; ordering is stable within a snapshot but
    /// otherwise backend-specific.
    async fn find_all(&self, page: u64, size: u64) -> Result<Vec<Credential>, StoreError>;
}

/// Backend selection, fixed once at process start and never mixed at runtime.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Mongo { uri: String, database: String },
    Provider { url: String, api_key: secrecy::SecretString },
    Redis { url: String },
    Memory,
}

/// Connect the configured backend and return it behind the uniform contract.
///
/// # Errors
///
/// Returns an error if the backend client cannot be constructed or the
/// initial connection/index setup fails.
pub async fn connect(config: StoreConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    match config {
        StoreConfig::Mongo { uri, database } => {
            info!("Using mongo credential store, database {database}");
            Ok(Arc::new(mongo::MongoStore::connect(&uri, &database).await?))
        }
        StoreConfig::Provider { url, api_key } => {
            info!("Using managed identity provider credential store at {url}");
            Ok(Arc::new(provider::ProviderStore::new(url, api_key)?))
        }
        StoreConfig::Redis { url } => {
            info!("Using redis credential store");
            Ok(Arc::new(redis::RedisStore::connect(&url).await?))
        }
        StoreConfig::Memory => {
            info!("Using in-memory credential store");
            Ok(Arc::new(memory::MemoryStore::new()))
        }
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs() as i64)
}
