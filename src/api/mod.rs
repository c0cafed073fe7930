//! API layer - HTTP handlers and routing
//!
//! - `/api/v1/*` - JSON API for the web client (session cookie or bearer token)
//! - `/api/*` - External API for mini-apps (API key and secret)
//! - `/uploads/*` - Uploaded avatars
//! - everything else - Server-rendered pages

pub mod admin;
pub mod apps;
pub mod auth;
pub mod common;
pub mod external;
pub mod feed;
pub mod friends;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod profile;
pub mod web;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, RequestStats};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let upload_limit = state.upload_config.max_file_size as usize;

    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/profile", profile::protected_router(upload_limit))
        .nest("/messages", messages::protected_router())
        .nest("/feed", feed::protected_router())
        .nest("/friends", friends::router())
        .nest("/notifications", notifications::router())
        .nest("/groups", groups::router())
        .nest("/apps", apps::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes, with the viewer resolved when a session is present
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/profile", profile::public_router())
        .nest("/messages", messages::public_router())
        .nest("/feed", feed::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the `/api` router for mini-apps
pub fn build_external_router(state: AppState) -> Router<AppState> {
    let app_routes = external::app_router().route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::require_api_key,
    ));

    external::public_router()
        .merge(app_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::api_rate_limit,
        ))
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            tracing::warn!("Invalid CORS origin {:?}: {}; cross-origin requests disabled", cors_origin, e);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::COOKIE,
            HeaderName::from_static(middleware::API_KEY_HEADER),
            HeaderName::from_static(middleware::API_SECRET_HEADER),
        ])
        .allow_credentials(true)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let pages = web::router().route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::optional_auth,
    ));

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest("/api", build_external_router(state.clone()))
        .nest_service("/uploads", ServeDir::new(&state.upload_config.path))
        .merge(pages)
        // Request stats is the outermost layer and sees every request
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::request_stats_middleware,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origin)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests;
