use crate::api::AppContext;
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
pub struct AuthenticateRequest {
    token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthenticateResponse {
    principal_id: String,
}

#[utoipa::path(
    post,
    path= "/idp/v1/authenticate",
    responses (
        (status = 200, description = "Token is valid", body = [AuthenticateResponse], content_type = "application/json"),
        (status = 401, description = "Token is invalid, expired or its principal is gone"),
    ),
    tag= "auth"
)]
// Token introspection for sibling services that cannot verify locally.
#[instrument(skip(context, payload))]
pub async fn authenticate(
    context: Extension<Arc<AppContext>>,
    payload: Option<Json<AuthenticateRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let principal_id = match context.tokens.verify(&request.token) {
        Ok(principal_id) => principal_id,
        Err(e) => {
            debug!("Token verification failed: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    // A valid signature is not enough: the principal must still exist.
    match context.store.find_by_principal_id(&principal_id).await {
        Ok(Some(_)) => Json(AuthenticateResponse { principal_id }).into_response(),
        Ok(None) => {
            debug!("Token principal no longer exists");
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(e) => {
            error!("Credential store failure during authenticate: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
