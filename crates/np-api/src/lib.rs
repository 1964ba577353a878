//! # np-api
//!
//! The web routing and orchestration layer for the portal.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod health;
pub mod middleware;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use np_core::error::Result;
use np_core::models::{Event, MediaEvent, Member};
use np_core::traits::{AuthProvider, Record};
use np_services::ResourceService;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

/// Where one resource type lives: route, backing file, upload directory
/// and the image shown when a record has none.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLayout {
    pub route: &'static str,
    pub data_file: &'static str,
    pub asset_dir: &'static str,
    pub fallback_image: &'static str,
}

pub const MEMBERS: ResourceLayout = ResourceLayout {
    route: "/api/members",
    data_file: "members.json",
    asset_dir: "members",
    fallback_image: "/owner.png",
};

pub const EVENTS: ResourceLayout = ResourceLayout {
    route: "/api/events",
    data_file: "events.json",
    asset_dir: "events",
    fallback_image: "/event-placeholder.jpg",
};

pub const MEDIA_EVENTS: ResourceLayout = ResourceLayout {
    route: "/api/media",
    data_file: "media_events.json",
    asset_dir: "uploads",
    fallback_image: "/event-placeholder.jpg",
};

/// HTTP-level knobs applied around the API routes.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Served under `/static`
    pub public_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cors_allow_any_origin: bool,
}

/// Handles shared by all requests; created at startup, dropped at shutdown.
#[derive(Clone)]
pub struct AppState {
    pub members: ResourceService<Member>,
    pub events: ResourceService<Event>,
    pub media: ResourceService<MediaEvent>,
    pub auth: Arc<dyn AuthProvider>,
    pub http: HttpOptions,
}

impl AppState {
    /// Writes any missing backing documents (members get their seed entries).
    pub async fn initialize(&self) -> Result<()> {
        self.members.initialize().await?;
        self.events.initialize().await?;
        self.media.initialize().await
    }
}

fn resource_routes<R: Record>(service: ResourceService<R>) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::list::<R>)
                .post(handlers::create::<R>)
                .put(handlers::update_by_body::<R>)
                .delete(handlers::delete_by_query::<R>),
        )
        .route(
            "/{id}",
            get(handlers::get::<R>)
                .put(handlers::update::<R>)
                .delete(handlers::delete::<R>),
        )
        .with_state(service)
}

/// Builds the application router.
///
/// `/health` and `/static` are public; mutating `/api` requests go through
/// the bearer-token guard.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest(MEMBERS.route, resource_routes(state.members.clone()))
        .nest(EVENTS.route, resource_routes(state.events.clone()))
        .nest(MEDIA_EVENTS.route, resource_routes(state.media.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            middleware::require_bearer,
        ));

    Router::new()
        .merge(api)
        .merge(health::health_routes())
        .nest_service("/static", ServeDir::new(&state.http.public_dir))
        .layer(DefaultBodyLimit::max(state.http.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(middleware::cors_policy(state.http.cors_allow_any_origin))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
