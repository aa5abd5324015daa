//! Schemaless key-value backend.
//!
//! Layout:
//!   user:{uuid}          JSON credential blob
//!   user:email:{email}   secondary index, value is the principal uuid,
//!                        written with SET NX as the uniqueness guard
//!   users:index          sorted set scored by creation time, for stable
//!                        pagination
//!
//! Principal ids are externally issued UUIDs; the store itself has no
//! notion of identity.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::{
    Credential, CredentialStore, CredentialUpdate, NewCredential, StoreError, unix_now,
};
use async_trait::async_trait;

const INDEX_KEY: &str = "users:index";

fn user_key(id: &str) -> String {
    format!("user:{id}")
}

fn email_key(email: &str) -> String {
    format!("user:email:{email}")
}

fn upstream(err: redis::RedisError) -> StoreError {
    StoreError::Upstream(err.into())
}

fn decode(raw: &str) -> Result<Credential, StoreError> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::Upstream(anyhow::anyhow!("corrupt credential blob: {err}")))
}

fn encode(credential: &Credential) -> Result<String, StoreError> {
    serde_json::to_string(credential)
        .map_err(|err| StoreError::Upstream(anyhow::anyhow!("failed to encode credential: {err}")))
}

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect with an auto-reconnecting connection manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the initial connection
    /// cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid redis URL")?;
        let connection = ConnectionManager::new(client)
            .await
            .context("Failed to connect to redis")?;

        Ok(Self { connection })
    }

    async fn fetch(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(user_key(id)).await.map_err(upstream)?;

        raw.as_deref().map(decode).transpose()
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn save(&self, new: NewCredential) -> Result<Credential, StoreError> {
        let mut connection = self.connection.clone();
        let id = Uuid::new_v4().to_string();

        let reserved: bool = connection
            .set_nx(email_key(&new.email), &id)
            .await
            .map_err(upstream)?;
        if !reserved {
            return Err(StoreError::DuplicateKey);
        }

        let now = unix_now();
        let credential = Credential {
            principal_id: id.clone(),
            email: new.email,
            password_hash: new.password_hash,
            mfa_secret: String::new(),
            mfa_enabled: false,
            mfa_verified: false,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };

        let _: () = connection
            .set(user_key(&id), encode(&credential)?)
            .await
            .map_err(upstream)?;
        let _: () = connection
            .zadd(INDEX_KEY, &id, now)
            .await
            .map_err(upstream)?;

        Ok(credential)
    }

    async fn find_by_principal_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        self.fetch(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let mut connection = self.connection.clone();
        let id: Option<String> = connection.get(email_key(email)).await.map_err(upstream)?;

        match id {
            Some(id) => self.fetch(&id).await,
            None => Ok(None),
        }
    }

    async fn update(&self, update: CredentialUpdate) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let Some(mut credential) = self.fetch(&update.principal_id).await? else {
            return Err(StoreError::NotFound);
        };

        let previous_email = credential.email.clone();
        if let Some(email) = &update.email {
            if *email != previous_email {
                let reserved: bool = connection
                    .set_nx(email_key(email), &update.principal_id)
                    .await
                    .map_err(upstream)?;
                if !reserved {
                    return Err(StoreError::DuplicateKey);
                }
            }
        }

        if !credential.apply(&update) {
            return Err(StoreError::NoOpUpdate);
        }

        let _: () = connection
            .set(user_key(&update.principal_id), encode(&credential)?)
            .await
            .map_err(upstream)?;

        if credential.email != previous_email {
            let _: () = connection
                .del(email_key(&previous_email))
                .await
                .map_err(upstream)?;
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let Some(credential) = self.fetch(id).await? else {
            return Err(StoreError::NotFound);
        };

        let _: () = connection
            .del(user_key(id))
            .await
            .map_err(upstream)?;
        let _: () = connection
            .del(email_key(&credential.email))
            .await
            .map_err(upstream)?;
        let _: () = connection.zrem(INDEX_KEY, id).await.map_err(upstream)?;

        Ok(())
    }

    async fn find_all(&self, page: u64, size: u64) -> Result<Vec<Credential>, StoreError> {
        if size == 0 {
            return Ok(Vec::new());
        }

        // ZRANGE treats negative offsets as counting from the tail, so an
        // offset that overflows u64 or isize must become an empty page.
        let Some(offset) = page.checked_mul(size) else {
            return Ok(Vec::new());
        };
        let Ok(start) = isize::try_from(offset) else {
            return Ok(Vec::new());
        };

        let count = isize::try_from(size).unwrap_or(isize::MAX);

        let mut connection = self.connection.clone();
        let stop = start.saturating_add(count - 1);
        let ids: Vec<String> = connection
            .zrange(INDEX_KEY, start, stop)
            .await
            .map_err(upstream)?;

        let mut credentials = Vec::with_capacity(ids.len());
        for id in ids {
            // Records deleted between ZRANGE and GET are skipped.
            if let Some(credential) = self.fetch(&id).await? {
                credentials.push(credential);
            }
        }

        Ok(credentials)
    }
}
