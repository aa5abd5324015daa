use crate::{api::AppContext, auth::AuthError, store::StoreError};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginOptions {
    mfa_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: u64,
    refresh_token: String,
}

#[utoipa::path(
    post,
    path= "/idp/v1/login",
    responses (
        (status = 200, description = "Login successful", body = [TokenResponse], content_type = "application/json"),
        (status = 400, description = "Missing or empty credentials"),
        (status = 401, description = "Incorrect credentials"),
    ),
    security(("basic_auth" = [])),
    tag= "auth"
)]
// axum handler for login
#[instrument(skip(context, headers, payload))]
pub async fn login(
    context: Extension<Arc<AppContext>>,
    headers: HeaderMap,
    payload: Option<Json<LoginOptions>>,
) -> Response {
    let Some((email, password)) = basic_credentials(&headers) else {
        debug!("Missing or malformed Basic Authorization header");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let mfa_code = payload.and_then(|Json(options)| options.mfa_code);

    match context
        .verifier
        .authenticate(&email, &password, mfa_code.as_deref())
        .await
    {
        Ok(tokens) => Json(TokenResponse {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token,
        })
        .into_response(),
        Err(AuthError::InvalidInput(reason)) => {
            debug!("Rejected login input: {}", reason);
            (StatusCode::BAD_REQUEST, reason.to_string()).into_response()
        }
        Err(AuthError::IncorrectCredentials) => StatusCode::UNAUTHORIZED.into_response(),
        Err(AuthError::Store(StoreError::Upstream(e))) => {
            error!("Credential store failure during login: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!("Login failed: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Decode `Authorization: Basic base64(email:password)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = Base64::decode_vec(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (email, password) = decoded.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_basic(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn basic_credentials_decodes_pair() {
        // base64("user@example.com:hunter2hunter2")
        let headers = headers_with_basic("Basic dXNlckBleGFtcGxlLmNvbTpodW50ZXIyaHVudGVyMg==");
        let (email, password) = basic_credentials(&headers).unwrap();
        assert_eq!(email, "user@example.com");
        assert_eq!(password, "hunter2hunter2");
    }

    #[test]
    fn basic_credentials_rejects_bearer() {
        let headers = headers_with_basic("Bearer sometoken");
        assert!(basic_credentials(&headers).is_none());
    }

    #[test]
    fn basic_credentials_rejects_missing_colon() {
        // base64("nocolonhere")
        let headers = headers_with_basic("Basic bm9jb2xvbmhlcmU=");
        assert!(basic_credentials(&headers).is_none());
    }

    #[test]
    fn basic_credentials_keeps_colons_in_password() {
        // base64("a@b.co:pa:ss:word")
        let headers = headers_with_basic("Basic YUBiLmNvOnBhOnNzOndvcmQ=");
        let (email, password) = basic_credentials(&headers).unwrap();
        assert_eq!(email, "a@b.co");
        assert_eq!(password, "pa:ss:word");
    }
}
