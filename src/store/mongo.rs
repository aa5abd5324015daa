//! Document database backend.
//!
//! One `users` collection; the auto-generated surrogate `_id` is the
//! principal id (its hex form outside this module). A unique index on
//! `email` is ensured at connect time so duplicates surface as server-side
//! write errors instead of racy read-then-write checks.

use anyhow::Context;
use futures_util::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

use super::{
    Credential, CredentialStore, CredentialUpdate, NewCredential, StoreError, unix_now,
};
use async_trait::async_trait;

const USERS_COLLECTION: &str = "users";

#[derive(Debug, Serialize, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    email: String,
    password_hash: String,
    mfa_secret: String,
    mfa_enabled: bool,
    mfa_verified: bool,
    refresh_token: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl UserDocument {
    fn into_credential(self) -> Credential {
        Credential {
            principal_id: self.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            email: self.email,
            password_hash: self.password_hash,
            mfa_secret: self.mfa_secret,
            mfa_enabled: self.mfa_enabled,
            mfa_verified: self.mfa_verified,
            refresh_token: self.refresh_token,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub struct MongoStore {
    collection: Collection<UserDocument>,
}

impl MongoStore {
    /// Connect and ensure the unique email index.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or index creation fails.
    pub async fn connect(uri: &str, database: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .context("Failed to connect to mongo")?;
        let collection = client.database(database).collection(USERS_COLLECTION);

        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection
            .create_index(index)
            .await
            .context("Failed to ensure unique email index")?;

        Ok(Self { collection })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

fn upstream(err: mongodb::error::Error) -> StoreError {
    StoreError::Upstream(err.into())
}

fn write_error(err: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::DuplicateKey
    } else {
        upstream(err)
    }
}

#[async_trait]
impl CredentialStore for MongoStore {
    async fn save(&self, new: NewCredential) -> Result<Credential, StoreError> {
        let now = unix_now();
        let mut document = UserDocument {
            id: None,
            email: new.email,
            password_hash: new.password_hash,
            mfa_secret: String::new(),
            mfa_enabled: false,
            mfa_verified: false,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };

        let result = self
            .collection
            .insert_one(&document)
            .await
            .map_err(write_error)?;

        match result.inserted_id {
            Bson::ObjectId(oid) => document.id = Some(oid),
            other => {
                return Err(StoreError::Upstream(anyhow::anyhow!(
                    "unexpected inserted id type: {other}"
                )));
            }
        }

        Ok(document.into_credential())
    }

    async fn find_by_principal_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        // A principal id that is not a valid ObjectId cannot exist here.
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(None);
        };

        let found = self
            .collection
            .find_one(doc! { "_id": oid })
            .await
            .map_err(upstream)?;

        Ok(found.map(UserDocument::into_credential))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let found = self
            .collection
            .find_one(doc! { "email": email })
            .await
            .map_err(upstream)?;

        Ok(found.map(UserDocument::into_credential))
    }

    async fn update(&self, update: CredentialUpdate) -> Result<(), StoreError> {
        let Ok(oid) = ObjectId::parse_str(&update.principal_id) else {
            return Err(StoreError::NotFound);
        };

        let mut set = Document::new();
        if let Some(email) = update.email {
            set.insert("email", email);
        }
        if let Some(hash) = update.password_hash {
            set.insert("password_hash", hash);
        }
        if let Some(secret) = update.mfa_secret {
            set.insert("mfa_secret", secret);
        }
        if let Some(enabled) = update.mfa_enabled {
            set.insert("mfa_enabled", enabled);
        }
        if let Some(verified) = update.mfa_verified {
            set.insert("mfa_verified", verified);
        }
        if let Some(token) = update.refresh_token {
            set.insert("refresh_token", token);
        }
        if set.is_empty() {
            return Err(StoreError::NoOpUpdate);
        }
        set.insert("updated_at", unix_now());

        let result = self
            .collection
            .update_one(doc! { "_id": oid }, doc! { "$set": set })
            .await
            .map_err(write_error)?;

        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        if result.modified_count == 0 {
            return Err(StoreError::NoOpUpdate);
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Err(StoreError::NotFound);
        };

        let result = self
            .collection
            .delete_one(doc! { "_id": oid })
            .await
            .map_err(upstream)?;

        if result.deleted_count == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn find_all(&self, page: u64, size: u64) -> Result<Vec<Credential>, StoreError> {
        // An offset past u64 can't address any document: empty page.
        let Some(offset) = page.checked_mul(size) else {
            return Ok(Vec::new());
        };

        let cursor = self
            .collection
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .skip(offset)
            .limit(size as i64)
            .await
            .map_err(upstream)?;

        let documents: Vec<UserDocument> = cursor.try_collect().await.map_err(upstream)?;

        Ok(documents
            .into_iter()
            .map(UserDocument::into_credential)
            .collect())
    }
}
