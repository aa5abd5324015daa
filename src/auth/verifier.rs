//! The login use case: credentials in, token pair out.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::mfa::MfaValidator;
use crate::store::{CredentialStore, CredentialUpdate, StoreError};
use crate::token::{TokenError, TokenManager};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} must not be empty")]
    InvalidInput(&'static str),
    // One error kind for a missing account, a wrong password and a wrong
    // MFA code: responses must not reveal which check failed.
    #[error("provided credentials do not match")]
    IncorrectCredentials,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Token pair produced by a successful login.
#[derive(Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: String,
}

pub struct Verifier {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenManager>,
    mfa: Arc<dyn MfaValidator>,
}

impl Verifier {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenManager>,
        mfa: Arc<dyn MfaValidator>,
    ) -> Self {
        Self { store, tokens, mfa }
    }

    /// Validate a login handle and password (and MFA code when the account
    /// enforces it), then mint an access token and rotate the refresh token.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty fields (checked before any store access),
    /// `IncorrectCredentials` for any failed check, `Store`/`Token` for
    /// infrastructure failures.
    pub async fn authenticate(
        &self,
        handle: &str,
        raw_password: &str,
        mfa_code: Option<&str>,
    ) -> Result<IssuedTokens, AuthError> {
        if handle.trim().is_empty() {
            return Err(AuthError::InvalidInput("login handle"));
        }
        if raw_password.is_empty() {
            return Err(AuthError::InvalidInput("password"));
        }

        let Some(credential) = self.store.find_by_email(handle).await? else {
            // Same outcome as a wrong password; the cause stays in the logs.
            debug!("login rejected: no credential for handle");
            return Err(AuthError::IncorrectCredentials);
        };

        if !bcrypt::verify(raw_password, &credential.password_hash).unwrap_or(false) {
            debug!(principal_id = %credential.principal_id, "login rejected: password mismatch");
            return Err(AuthError::IncorrectCredentials);
        }

        // MFA is enforced only when enrollment completed both flags.
        if credential.mfa_enabled && credential.mfa_verified {
            let valid = mfa_code
                .is_some_and(|code| self.mfa.validate(code, &credential.mfa_secret));
            if !valid {
                debug!(principal_id = %credential.principal_id, "login rejected: MFA check failed");
                return Err(AuthError::IncorrectCredentials);
            }
        }

        let access_token = self.tokens.generate(&credential.principal_id)?;
        let refresh_token = new_refresh_token()?;

        // Rotation is not transactional with issuance: a store failure here
        // is logged and the already-minted tokens are still returned.
        let rotation = self
            .store
            .update(CredentialUpdate {
                principal_id: credential.principal_id.clone(),
                refresh_token: Some(refresh_token.clone()),
                ..CredentialUpdate::default()
            })
            .await;
        match rotation {
            Ok(()) | Err(StoreError::NoOpUpdate) => {}
            Err(err) => {
                error!(
                    principal_id = %credential.principal_id,
                    "Failed to persist rotated refresh token: {err}"
                );
            }
        }

        Ok(IssuedTokens {
            access_token,
            expires_in: self.tokens.ttl_seconds(),
            refresh_token,
        })
    }
}

/// Opaque refresh token: a random seed through the same one-way hash used
/// for passwords, so a leaked store never yields a usable token.
fn new_refresh_token() -> Result<String, AuthError> {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);

    bcrypt::hash(Base64UrlUnpadded::encode_string(&seed), bcrypt::DEFAULT_COST)
        .map_err(|_| AuthError::Token(TokenError::Signing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Credential, NewCredential, memory::MemoryStore};
    use secrecy::SecretString;

    struct FixedMfa(bool);

    impl MfaValidator for FixedMfa {
        fn validate(&self, _code: &str, _secret: &str) -> bool {
            self.0
        }
    }

    const TEST_BCRYPT_COST: u32 = 4;

    async fn seeded(
        mfa_outcome: bool,
    ) -> (Arc<MemoryStore>, Verifier, String) {
        let store = Arc::new(MemoryStore::new());
        let created = store
            .save(NewCredential {
                email: "a@b.com".to_string(),
                password_hash: bcrypt::hash("pw1", TEST_BCRYPT_COST).unwrap(),
            })
            .await
            .unwrap();

        let tokens = Arc::new(TokenManager::new(
            SecretString::from("test-secret".to_string()),
            3600,
        ));
        let verifier = Verifier::new(store.clone(), tokens, Arc::new(FixedMfa(mfa_outcome)));

        (store, verifier, created.principal_id)
    }

    async fn enable_mfa(store: &MemoryStore, principal_id: &str) {
        store
            .update(CredentialUpdate {
                principal_id: principal_id.to_string(),
                mfa_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
                mfa_enabled: Some(true),
                mfa_verified: Some(true),
                ..CredentialUpdate::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn login_succeeds_without_mfa() {
        let (_store, verifier, _) = seeded(false).await;

        let issued = verifier.authenticate("a@b.com", "pw1", None).await.unwrap();
        assert!(!issued.access_token.is_empty());
        assert!(!issued.refresh_token.is_empty());
        assert_eq!(issued.expires_in, 3600);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_handle_are_the_same_error() {
        let (_store, verifier, _) = seeded(false).await;

        let wrong = verifier.authenticate("a@b.com", "wrong", None).await;
        assert!(matches!(wrong, Err(AuthError::IncorrectCredentials)));

        let unknown = verifier.authenticate("ghost@b.com", "pw1", None).await;
        assert!(matches!(unknown, Err(AuthError::IncorrectCredentials)));
    }

    #[tokio::test]
    async fn empty_fields_are_rejected_before_store_access() {
        let (_store, verifier, _) = seeded(false).await;

        assert!(matches!(
            verifier.authenticate("", "pw1", None).await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            verifier.authenticate("a@b.com", "", None).await,
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn enforced_mfa_failure_matches_wrong_password_error() {
        let (store, verifier, principal_id) = seeded(false).await;
        enable_mfa(&store, &principal_id).await;

        let missing_code = verifier.authenticate("a@b.com", "pw1", None).await;
        assert!(matches!(missing_code, Err(AuthError::IncorrectCredentials)));

        let wrong_code = verifier
            .authenticate("a@b.com", "pw1", Some("000000"))
            .await;
        assert!(matches!(wrong_code, Err(AuthError::IncorrectCredentials)));
    }

    #[tokio::test]
    async fn enforced_mfa_passes_with_valid_code() {
        let (store, verifier, principal_id) = seeded(true).await;
        enable_mfa(&store, &principal_id).await;

        let issued = verifier
            .authenticate("a@b.com", "pw1", Some("123456"))
            .await
            .unwrap();
        assert!(!issued.access_token.is_empty());
    }

    #[tokio::test]
    async fn half_enrolled_mfa_is_not_enforced() {
        let (store, verifier, principal_id) = seeded(false).await;
        store
            .update(CredentialUpdate {
                principal_id,
                mfa_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
                mfa_enabled: Some(true),
                // mfa_verified stays false: enrollment never completed.
                ..CredentialUpdate::default()
            })
            .await
            .unwrap();

        let issued = verifier.authenticate("a@b.com", "pw1", None).await;
        assert!(issued.is_ok());
    }

    #[tokio::test]
    async fn each_login_rotates_the_stored_refresh_token() {
        let (store, verifier, principal_id) = seeded(false).await;

        let first = verifier.authenticate("a@b.com", "pw1", None).await.unwrap();
        let stored_first = store
            .find_by_principal_id(&principal_id)
            .await
            .unwrap()
            .unwrap()
            .refresh_token;
        assert_eq!(stored_first.as_deref(), Some(first.refresh_token.as_str()));

        let second = verifier.authenticate("a@b.com", "pw1", None).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let stored_second = store
            .find_by_principal_id(&principal_id)
            .await
            .unwrap()
            .unwrap()
            .refresh_token;
        assert_eq!(
            stored_second.as_deref(),
            Some(second.refresh_token.as_str())
        );
    }

    /// Store whose writes always fail, for the rotation-failure path.
    struct WriteFailingStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl CredentialStore for WriteFailingStore {
        async fn save(&self, new: NewCredential) -> Result<Credential, StoreError> {
            self.inner.save(new).await
        }

        async fn find_by_principal_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
            self.inner.find_by_principal_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
            self.inner.find_by_email(email).await
        }

        async fn update(&self, _update: CredentialUpdate) -> Result<(), StoreError> {
            Err(StoreError::Upstream(anyhow::anyhow!("connection reset")))
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }

        async fn find_all(&self, page: u64, size: u64) -> Result<Vec<Credential>, StoreError> {
            self.inner.find_all(page, size).await
        }
    }

    #[tokio::test]
    async fn failed_rotation_still_returns_the_minted_tokens() {
        let store = Arc::new(WriteFailingStore {
            inner: MemoryStore::new(),
        });
        store
            .inner
            .save(NewCredential {
                email: "a@b.com".to_string(),
                password_hash: bcrypt::hash("pw1", TEST_BCRYPT_COST).unwrap(),
            })
            .await
            .unwrap();

        let tokens = Arc::new(TokenManager::new(
            SecretString::from("test-secret".to_string()),
            3600,
        ));
        let verifier = Verifier::new(store.clone(), tokens, Arc::new(FixedMfa(false)));

        // The update failure is logged, not surfaced: the caller gets a
        // usable token pair even though the stored refresh token is stale.
        let issued = verifier.authenticate("a@b.com", "pw1", None).await.unwrap();
        assert!(!issued.access_token.is_empty());
        assert!(!issued.refresh_token.is_empty());

        let stored = store
            .find_by_email("a@b.com")
            .await
            .unwrap()
            .unwrap()
            .refresh_token;
        assert_eq!(stored, None);
    }
}
