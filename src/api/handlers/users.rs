use crate::{
    api::AppContext,
    api::handlers::{valid_email, valid_password},
    store::{Credential, NewCredential, StoreError},
};
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::{IntoParams, ToSchema};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(ToSchema, Deserialize, Debug)]
pub struct UserSignup {
    username: Option<String>,
    email: String,
    password: String,
}

/// Public view of a credential. Secret material never leaves the store layer.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserView {
    pub principal_id: String,
    pub email: String,
    pub mfa_enabled: bool,
    pub mfa_verified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Credential> for UserView {
    fn from(credential: Credential) -> Self {
        Self {
            principal_id: credential.principal_id,
            email: credential.email,
            mfa_enabled: credential.mfa_enabled,
            mfa_verified: credential.mfa_verified,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct Pagination {
    page: Option<u64>,
    size: Option<u64>,
}

#[utoipa::path(
    post,
    path= "/idp/v1/users",
    responses (
        (status = 201, description = "User created", body = [UserView], content_type = "application/json"),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "User with the specified email already exists"),
    ),
    tag= "users"
)]
// axum handler for signup
#[instrument(skip(context, payload))]
pub async fn create(
    context: Extension<Arc<AppContext>>,
    payload: Option<Json<UserSignup>>,
) -> Response {
    let user: UserSignup = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Some(username) = &user.username {
        debug!("signup username: {}", username);
    }

    let email = user.email.trim().to_lowercase();

    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if !valid_password(&user.password) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    let password_hash = match bcrypt::hash(&user.password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Error hashing password: {:?}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match context
        .store
        .save(NewCredential {
            email,
            password_hash,
        })
        .await
    {
        Ok(credential) => {
            (StatusCode::CREATED, Json(UserView::from(credential))).into_response()
        }
        Err(StoreError::DuplicateKey) => {
            error!("User already exists");
            (StatusCode::CONFLICT, "User already exists".to_string()).into_response()
        }
        Err(e) => {
            error!("Error creating user: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path= "/idp/v1/users",
    params(Pagination),
    responses (
        (status = 200, description = "Page of users", body = [UserView], content_type = "application/json"),
    ),
    security(("bearer_auth" = [])),
    tag= "users"
)]
// axum handler for listing users
#[instrument(skip(context))]
pub async fn list(
    context: Extension<Arc<AppContext>>,
    Query(pagination): Query<Pagination>,
) -> Response {
    let page = pagination.page.unwrap_or(0);
    let size = pagination
        .size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    match context.store.find_all(page, size).await {
        Ok(credentials) => {
            let users: Vec<UserView> = credentials.into_iter().map(UserView::from).collect();
            Json(users).into_response()
        }
        Err(e) => {
            error!("Error listing users: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path= "/idp/v1/users/{id}",
    params(("id" = String, Path, description = "Principal id")),
    responses (
        (status = 200, description = "User found", body = [UserView], content_type = "application/json"),
        (status = 404, description = "No user with the specified id"),
    ),
    security(("bearer_auth" = [])),
    tag= "users"
)]
// axum handler for fetching one user
#[instrument(skip(context))]
pub async fn get_by_id(context: Extension<Arc<AppContext>>, Path(id): Path<String>) -> Response {
    match context.store.find_by_principal_id(&id).await {
        Ok(Some(credential)) => Json(UserView::from(credential)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Error fetching user: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path= "/idp/v1/users/{id}",
    params(("id" = String, Path, description = "Principal id")),
    responses (
        (status = 204, description = "User deleted"),
        (status = 404, description = "No user with the specified id"),
    ),
    security(("bearer_auth" = [])),
    tag= "users"
)]
// Deleting a user revokes its outstanding tokens at the gate.
#[instrument(skip(context))]
pub async fn delete(context: Extension<Arc<AppContext>>, Path(id): Path<String>) -> Response {
    match context.store.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(StoreError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Error deleting user: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
