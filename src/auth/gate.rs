//! Per-request authentication gate.
//!
//! Every inbound request passes here exactly once (upgrade requests are
//! checked at establishment, never per message). Whitelisted routes are
//! forwarded untouched; everything else needs a bearer token that
//! verifies, whose subject still exists in the credential store. The
//! existence re-check is what makes account deletion revoke all
//! outstanding tokens without a blacklist.

use axum::{
    extract::{Extension, Request},
    http::{Method, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::AppContext;

/// The authenticated identity, attached to request extensions for
/// downstream handlers. A typed extension, not a stringly-typed key.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
}

/// Immutable allow-list of unauthenticated routes, built once at startup
/// and looked up per call. Unmatched routes always require authentication.
#[derive(Debug)]
pub struct Whitelist {
    routes: HashSet<(Method, String)>,
}

impl Whitelist {
    pub fn new<'a>(routes: impl IntoIterator<Item = (Method, &'a str)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(method, path)| (method, path.to_string()))
                .collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, method: &Method, path: &str) -> bool {
        self.routes
            .contains(&(method.clone(), path.to_string()))
    }
}

/// The routes reachable without a token: login, signup, the authenticate
/// endpoint itself, and liveness.
#[must_use]
pub fn default_whitelist() -> Whitelist {
    Whitelist::new([
        (Method::POST, "/idp/v1/login"),
        (Method::POST, "/idp/v1/users"),
        (Method::POST, "/idp/v1/authenticate"),
        (Method::GET, "/health"),
    ])
}

/// axum middleware wrapping every route of the service.
pub async fn gate(
    Extension(context): Extension<Arc<AppContext>>,
    mut request: Request,
    next: Next,
) -> Response {
    if context
        .whitelist
        .contains(request.method(), request.uri().path())
    {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(&request) else {
        return unauthorized();
    };

    let principal_id = match context.tokens.verify(&token) {
        Ok(principal_id) => principal_id,
        Err(err) => {
            // The caller never learns whether the token was malformed,
            // expired or forged.
            debug!("request rejected: {err}");
            return unauthorized();
        }
    };

    match context.store.find_by_principal_id(&principal_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(%principal_id, "request rejected: principal no longer exists");
            return unauthorized();
        }
        Err(err) => {
            error!("Failed to confirm principal: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    request.extensions_mut().insert(Principal { id: principal_id });

    next.run(request).await
}

fn bearer_token(request: &Request) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn unauthorized() -> Response {
    StatusCode::UNAUTHORIZED.into_response()
}
