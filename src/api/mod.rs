//! HTTP surface: router, shared context and server startup.

pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

use anyhow::Result;
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{Verifier, Whitelist, gate};
use crate::store::CredentialStore;
use crate::token::TokenManager;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Everything a request needs, built once at startup and shared via a
/// single Extension. No mutable state: concurrency is unbounded.
pub struct AppContext {
    pub store: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenManager>,
    pub verifier: Verifier,
    pub whitelist: Whitelist,
}

/// Build the application router around a shared context.
///
/// Every route is wrapped by the authentication gate; the whitelist inside
/// the context decides which ones pass unauthenticated.
pub fn router(context: Arc<AppContext>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    axum::Router::new()
        .route("/health", get(handlers::health::health))
        .route("/idp/v1/login", post(handlers::login::login))
        .route("/idp/v1/authenticate", post(handlers::authenticate::authenticate))
        .route(
            "/idp/v1/users",
            post(handlers::users::create).get(handlers::users::list),
        )
        .route(
            "/idp/v1/users/:id",
            get(handlers::users::get_by_id).delete(handlers::users::delete),
        )
        .route("/idp/v1/profile", get(handlers::profile::profile))
        .route("/idp/v1/profile/mfa", put(handlers::profile::update_mfa))
        .layer(middleware::from_fn(gate))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(context)),
        )
}

/// Start the server.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn new(port: u16, context: Arc<AppContext>) -> Result<()> {
    let app = router(context);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
