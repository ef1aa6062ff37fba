//! API route definitions

use crate::config::{ApiKeyPolicy, Settings};
use crate::download::DownloadManager;
use crate::sources::SourceRegistry;
use crate::storage::ModelStorage;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use super::{auth, handlers};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<ModelStorage>,
    pub downloads: Arc<DownloadManager>,
    pub sources: SourceRegistry,
    pub settings: Arc<Settings>,
    pub api_key: ApiKeyPolicy,
    /// Send `Strict-Transport-Security` on every response
    pub hsts: bool,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/models", get(handlers::list_models))
        .route(
            "/api/v1/models/{source}/{*model_id}",
            get(handlers::get_model).delete(handlers::delete_model),
        )
        .route("/api/v1/search", get(handlers::search))
        .route("/api/v1/downloads", post(handlers::download))
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/clean", post(handlers::clean))
        .route("/api/v1/export", post(handlers::export))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let cors = cors_layer(&state.settings.api.cors_origins);
    let hsts = state.hsts;

    Router::new()
        // Health stays reachable without credentials
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::STRICT_TRANSPORT_SECURITY,
                    move |_: &axum::response::Response| {
                        hsts.then(|| HeaderValue::from_static("max-age=31536000; includeSubDomains"))
                    },
                )),
        )
}

/// CORS for the configured origins; `*` allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(AllowOrigin::any());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
}
