use crate::{
    api::AppContext,
    api::handlers::users::UserView,
    auth::Principal,
    store::{CredentialUpdate, StoreError},
};
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, instrument, warn};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
pub struct MfaSettings {
    enabled: bool,
    secret: Option<String>,
}

#[utoipa::path(
    get,
    path= "/idp/v1/profile",
    responses (
        (status = 200, description = "The caller's own account", body = [UserView], content_type = "application/json"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag= "profile"
)]
// axum handler for the caller's own account
#[instrument(skip(context, principal))]
pub async fn profile(
    context: Extension<Arc<AppContext>>,
    principal: Extension<Principal>,
) -> Response {
    match context.store.find_by_principal_id(&principal.id).await {
        Ok(Some(credential)) => Json(UserView::from(credential)).into_response(),
        // The gate already checked existence; a miss here means a
        // concurrent delete won the race.
        Ok(None) => StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => {
            error!("Error fetching profile: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path= "/idp/v1/profile/mfa",
    responses (
        (status = 204, description = "MFA settings stored"),
        (status = 400, description = "Enabling MFA without a secret"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag= "profile"
)]
// axum handler for MFA enrollment
#[instrument(skip(context, principal, payload))]
pub async fn update_mfa(
    context: Extension<Arc<AppContext>>,
    principal: Extension<Principal>,
    payload: Option<Json<MfaSettings>>,
) -> Response {
    let settings: MfaSettings = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if settings.enabled && settings.secret.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            "Enabling MFA requires a secret".to_string(),
        )
            .into_response();
    }

    let update = CredentialUpdate {
        principal_id: principal.id.clone(),
        mfa_enabled: Some(settings.enabled),
        mfa_verified: Some(settings.enabled),
        mfa_secret: settings.secret,
        ..CredentialUpdate::default()
    };

    match context.store.update(update).await {
        Ok(()) | Err(StoreError::NoOpUpdate) => StatusCode::NO_CONTENT.into_response(),
        Err(StoreError::Unsupported(what)) => {
            warn!("Store cannot persist {}; settings not stored", what);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(StoreError::NotFound) => StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => {
            error!("Error updating MFA settings: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
