//! Managed identity provider backend.
//!
//! Accounts live in an external provider reached over HTTPS; the provider
//! mints and owns the principal UID. The provider only models account
//! fields (email, password hash): MFA flags, MFA secrets and refresh
//! tokens are not representable there. Updates touching only those fields
//! succeed as a logged no-op: account CRUD must keep working on the fields
//! the provider does support.
//!
//! Wire shape, relative to the configured base URL:
//!   POST   /v1/accounts            create  -> 201 account | 409
//!   GET    /v1/accounts/{uid}      fetch   -> 200 account | 404
//!   GET    /v1/accounts?email=     lookup  -> 200 account | 404
//!   PATCH  /v1/accounts/{uid}      update  -> 200 account | 404
//!   DELETE /v1/accounts/{uid}      delete  -> 204         | 404
//!   GET    /v1/accounts?page=&size= listing -> 200 {accounts: [...]}

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};
use url::Url;

use super::{Credential, CredentialStore, CredentialUpdate, NewCredential, StoreError};
use async_trait::async_trait;

const API_KEY_HEADER: &str = "X-Api-Key";

/// Account representation returned by the provider.
#[derive(Debug, Serialize, Deserialize)]
struct Account {
    uid: String,
    email: String,
    #[serde(default)]
    password_hash: String,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
}

impl Account {
    fn into_credential(self) -> Credential {
        // Fields the provider cannot hold come back at their defaults; MFA
        // is therefore never enforced for accounts on this backend.
        Credential {
            principal_id: self.uid,
            email: self.email,
            password_hash: self.password_hash,
            mfa_secret: String::new(),
            mfa_enabled: false,
            mfa_verified: false,
            refresh_token: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountPage {
    #[serde(default)]
    accounts: Vec<Account>,
}

pub struct ProviderStore {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl ProviderStore {
    /// Build the provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// cannot be constructed.
    pub fn new(base_url: String, api_key: SecretString) -> Result<Self> {
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid identity provider URL: {base_url}"))?;
        let client = Client::builder()
            .user_agent(crate::api::APP_USER_AGENT)
            .build()
            .context("Failed to build identity provider client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|err| StoreError::Upstream(anyhow!("invalid provider endpoint: {err}")))
    }

    async fn provider_error(response: Response) -> StoreError {
        let status = response.status();
        let message = match response.json::<Value>().await {
            Ok(body) => body["errors"][0].as_str().unwrap_or_default().to_string(),
            Err(_) => String::new(),
        };

        error!("Identity provider request failed: {status} {message}");

        StoreError::Upstream(anyhow!("identity provider: {status}, {message}"))
    }

    async fn read_account(response: Response) -> Result<Account, StoreError> {
        response
            .json::<Account>()
            .await
            .map_err(|err| StoreError::Upstream(anyhow!("invalid provider response: {err}")))
    }
}

#[async_trait]
impl CredentialStore for ProviderStore {
    async fn save(&self, new: NewCredential) -> Result<Credential, StoreError> {
        let endpoint = self.endpoint("/v1/accounts")?;
        let response = self
            .client
            .post(endpoint)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&json!({
                "email": new.email,
                "password_hash": new.password_hash,
            }))
            .send()
            .await
            .map_err(|err| StoreError::Upstream(err.into()))?;

        match response.status() {
            StatusCode::CONFLICT => Err(StoreError::DuplicateKey),
            status if status.is_success() => {
                Ok(Self::read_account(response).await?.into_credential())
            }
            _ => Err(Self::provider_error(response).await),
        }
    }

    async fn find_by_principal_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        let endpoint = self.endpoint(&format!("/v1/accounts/{id}"))?;
        let response = self
            .client
            .get(endpoint)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| StoreError::Upstream(err.into()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(Self::read_account(response).await?.into_credential()))
            }
            _ => Err(Self::provider_error(response).await),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let mut endpoint = self.endpoint("/v1/accounts")?;
        endpoint.query_pairs_mut().append_pair("email", email);

        let response = self
            .client
            .get(endpoint)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| StoreError::Upstream(err.into()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(Self::read_account(response).await?.into_credential()))
            }
            _ => Err(Self::provider_error(response).await),
        }
    }

    async fn update(&self, update: CredentialUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Err(StoreError::NoOpUpdate);
        }

        let mut body = serde_json::Map::new();
        if let Some(email) = &update.email {
            body.insert("email".to_string(), Value::String(email.clone()));
        }
        if let Some(hash) = &update.password_hash {
            body.insert("password_hash".to_string(), Value::String(hash.clone()));
        }

        let dropped = update.mfa_secret.is_some()
            || update.mfa_enabled.is_some()
            || update.mfa_verified.is_some()
            || update.refresh_token.is_some();
        if dropped {
            // Capability gap, not a failure: the provider has nowhere to put
            // MFA material or refresh tokens.
            warn!(
                principal_id = %update.principal_id,
                "{}",
                StoreError::Unsupported("MFA or refresh token fields")
            );
        }
        if body.is_empty() {
            return Ok(());
        }

        let endpoint = self.endpoint(&format!("/v1/accounts/{}", update.principal_id))?;
        let response = self
            .client
            .patch(endpoint)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|err| StoreError::Upstream(err.into()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            StatusCode::CONFLICT => Err(StoreError::DuplicateKey),
            status if status.is_success() => Ok(()),
            _ => Err(Self::provider_error(response).await),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let endpoint = self.endpoint(&format!("/v1/accounts/{id}"))?;
        let response = self
            .client
            .delete(endpoint)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| StoreError::Upstream(err.into()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            status if status.is_success() => Ok(()),
            _ => Err(Self::provider_error(response).await),
        }
    }

    async fn find_all(&self, page: u64, size: u64) -> Result<Vec<Credential>, StoreError> {
        let mut endpoint = self.endpoint("/v1/accounts")?;
        endpoint
            .query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string());

        let response = self
            .client
            .get(endpoint)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| StoreError::Upstream(err.into()))?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let accounts = response
            .json::<AccountPage>()
            .await
            .map_err(|err| StoreError::Upstream(anyhow!("invalid provider response: {err}")))?;

        Ok(accounts
            .accounts
            .into_iter()
            .map(Account::into_credential)
            .collect())
    }
}
