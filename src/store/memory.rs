//! In-memory credential store.
//!
//! Backs the test suite and `--store memory` for local development. Same
//! contract semantics as the network backends: externally issued UUIDs,
//! unique emails, stable creation-order pagination.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    Credential, CredentialStore, CredentialUpdate, NewCredential, StoreError, unix_now,
};
use async_trait::async_trait;

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Credential>,
    emails: DashMap<String, String>,
    // Insertion order, for stable pagination.
    order: Mutex<Vec<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, new: NewCredential) -> Result<Credential, StoreError> {
        let id = Uuid::new_v4().to_string();

        match self.emails.entry(new.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateKey),
            Entry::Vacant(vacant) => {
                vacant.insert(id.clone());
            }
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

        self.records.insert(id.clone(), credential.clone());
        if let Ok(mut order) = self.order.lock() {
            order.push(id);
        }

        Ok(credential)
    }

    async fn find_by_principal_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.records.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let Some(id) = self.emails.get(email).map(|entry| entry.clone()) else {
            return Ok(None);
        };

        Ok(self.records.get(&id).map(|entry| entry.clone()))
    }

    async fn update(&self, update: CredentialUpdate) -> Result<(), StoreError> {
        let Some(mut entry) = self.records.get_mut(&update.principal_id) else {
            return Err(StoreError::NotFound);
        };

        if let Some(email) = &update.email {
            if *email != entry.email {
                match self.emails.entry(email.clone()) {
                    Entry::Occupied(_) => return Err(StoreError::DuplicateKey),
                    Entry::Vacant(vacant) => {
                        vacant.insert(update.principal_id.clone());
                    }
                }
                self.emails.remove(&entry.email);
            }
        }

        if !entry.apply(&update) {
            return Err(StoreError::NoOpUpdate);
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let Some((_, credential)) = self.records.remove(id) else {
            return Err(StoreError::NotFound);
        };

        self.emails.remove(&credential.email);
        if let Ok(mut order) = self.order.lock() {
            order.retain(|entry| entry != id);
        }

        Ok(())
    }

    async fn find_all(&self, page: u64, size: u64) -> Result<Vec<Credential>, StoreError> {
        // An offset past u64 can't address anything: empty page, not a wrap.
        let Some(offset) = page.checked_mul(size) else {
            return Ok(Vec::new());
        };

        let ids: Vec<String> = match self.order.lock() {
            Ok(order) => order
                .iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(size as usize)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        };

        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|entry| entry.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_credential(email: &str) -> NewCredential {
        NewCredential {
            email: email.to_string(),
            password_hash: "$2b$04$fakehash".to_string(),
        }
    }

    #[tokio::test]
    async fn save_assigns_identity_and_rejects_duplicate_email() -> Result<(), StoreError> {
        let store = MemoryStore::new();

        let created = store.save(new_credential("a@b.com")).await?;
        assert!(!created.principal_id.is_empty());
        assert!(created.created_at > 0);

        let duplicate = store.save(new_credential("a@b.com")).await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateKey)));

        Ok(())
    }

    #[tokio::test]
    async fn lookup_miss_is_none_not_an_error() -> Result<(), StoreError> {
        let store = MemoryStore::new();

        assert!(store.find_by_principal_id("missing").await?.is_none());
        assert!(store.find_by_email("nobody@b.com").await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn update_distinguishes_not_found_and_noop() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let created = store.save(new_credential("a@b.com")).await?;

        let missing = store
            .update(CredentialUpdate {
                principal_id: "missing".to_string(),
                mfa_enabled: Some(true),
                ..CredentialUpdate::default()
            })
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound)));

        let noop = store
            .update(CredentialUpdate {
                principal_id: created.principal_id.clone(),
                mfa_enabled: Some(false),
                ..CredentialUpdate::default()
            })
            .await;
        assert!(matches!(noop, Err(StoreError::NoOpUpdate)));

        store
            .update(CredentialUpdate {
                principal_id: created.principal_id.clone(),
                mfa_enabled: Some(true),
                mfa_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
                ..CredentialUpdate::default()
            })
            .await?;

        let updated = store
            .find_by_principal_id(&created.principal_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        assert!(updated.mfa_enabled);
        assert_eq!(updated.mfa_secret, "JBSWY3DPEHPK3PXP");

        Ok(())
    }

    #[tokio::test]
    async fn email_change_moves_the_uniqueness_claim() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let first = store.save(new_credential("a@b.com")).await?;
        store.save(new_credential("c@d.com")).await?;

        let taken = store
            .update(CredentialUpdate {
                principal_id: first.principal_id.clone(),
                email: Some("c@d.com".to_string()),
                ..CredentialUpdate::default()
            })
            .await;
        assert!(matches!(taken, Err(StoreError::DuplicateKey)));

        store
            .update(CredentialUpdate {
                principal_id: first.principal_id.clone(),
                email: Some("new@b.com".to_string()),
                ..CredentialUpdate::default()
            })
            .await?;

        assert!(store.find_by_email("a@b.com").await?.is_none());
        assert!(store.find_by_email("new@b.com").await?.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_record_and_email_claim() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let created = store.save(new_credential("a@b.com")).await?;

        store.delete(&created.principal_id).await?;

        assert!(matches!(
            store.delete(&created.principal_id).await,
            Err(StoreError::NotFound)
        ));
        assert!(store.find_by_email("a@b.com").await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn pagination_is_stable_in_creation_order() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        for index in 0..5 {
            store.save(new_credential(&format!("user{index}@b.com"))).await?;
        }

        let first = store.find_all(0, 2).await?;
        let second = store.find_all(1, 2).await?;
        let third = store.find_all(2, 2).await?;

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert_eq!(first[0].email, "user0@b.com");
        assert_eq!(second[0].email, "user2@b.com");
        assert_eq!(third[0].email, "user4@b.com");

        Ok(())
    }

    #[tokio::test]
    async fn pagination_offset_overflow_is_an_empty_page() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store.save(new_credential("a@b.com")).await?;

        assert!(store.find_all(u64::MAX, 2).await?.is_empty());
        assert!(store.find_all(u64::MAX, u64::MAX).await?.is_empty());

        Ok(())
    }
}
