//! Router construction and the serving loop (spec §6.1/§6.3), following
//! the teacher's `api/server.rs` shape: state via `State<AppState>`,
//! every handler reachable both at the root path and nested under
//! `/contexts/:context` (spec §6.1: "Every listed endpoint exists both
//! at the root path ... and under `/contexts/{context}`").

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{BoxError, Router};
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::{Config, CorsConfig};
use crate::engine::Registry;
use crate::security::{audit_middleware, auth_middleware, PermissionChecker};

use super::routes::{self, AppState};

/// Routes reachable at the default context's root path; nested a second
/// time under `/contexts/:context` by [`ApiServer::router`] so both
/// forms dispatch to the same handlers (spec §4.5, §6.1).
fn scoped_routes() -> Router<AppState> {
    Router::new()
        .route("/schemas", get(routes::list_schemas))
        .route("/schemas/ids/:id", get(routes::get_schema_by_id))
        .route("/schemas/ids/:id/schema", get(routes::get_schema_text_by_id))
        .route("/schemas/ids/:id/subjects", get(routes::get_subjects_by_id))
        .route("/schemas/ids/:id/versions", get(routes::get_versions_by_id))
        .route("/subjects", get(routes::list_subjects))
        .route(
            "/subjects/:subject/versions",
            post(routes::register_schema).get(routes::list_versions),
        )
        .route("/subjects/:subject", post(routes::lookup_schema).delete(routes::delete_subject))
        .route("/subjects/:subject/versions/:version", get(routes::get_version).delete(routes::delete_version))
        .route("/subjects/:subject/versions/:version/schema", get(routes::get_version_schema_text))
        .route("/subjects/:subject/versions/:version/referencedby", get(routes::get_referenced_by))
        .route("/config", get(routes::get_global_config).put(routes::set_global_config).delete(routes::delete_global_config))
        .route(
            "/config/:subject",
            get(routes::get_subject_config)
                .put(routes::set_subject_config)
                .delete(routes::delete_subject_config),
        )
        .route(
            "/mode",
            get(routes::get_global_mode)
                .put(routes::set_global_mode)
                .delete(routes::delete_global_mode),
        )
        .route(
            "/mode/:subject",
            get(routes::get_subject_mode)
                .put(routes::set_subject_mode)
                .delete(routes::delete_subject_mode),
        )
        .route(
            "/compatibility/subjects/:subject/versions/:version",
            post(routes::check_compatibility_version),
        )
        .route(
            "/compatibility/subjects/:subject/versions",
            post(routes::check_compatibility_all),
        )
        .route("/import/schemas", post(routes::import_schemas))
}

/// Routes that make sense only once, never duplicated under a context
/// prefix: health probes, schema-type discovery, context listing, cluster
/// metadata.
fn global_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::health))
        .route("/health/live", get(routes::health))
        .route("/health/ready", get(routes::health))
        .route("/health/startup", get(routes::health))
        .route("/schemas/types", get(routes::schema_types))
        .route("/contexts", get(routes::list_contexts))
        .route("/v1/metadata/id", get(routes::metadata_id))
        .route("/v1/metadata/version", get(routes::metadata_version))
}

/// Converts a timed-out request into the 50002 storage-failure-shaped
/// surface spec §5 requires ("the transport imposes a 30-second default
/// timeout per request"); any other propagated error becomes a 500.
async fn handle_transport_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled error: {err}"))
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }
    if config.origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Owns the engine and security config; builds and serves the `axum`
/// router (spec §2 "HTTP transport ... external collaborator reached
/// only through a thin adapter").
pub struct ApiServer {
    registry: Arc<Registry>,
    config: Config,
    permission_checker: Option<Arc<PermissionChecker>>,
}

impl ApiServer {
    pub fn new(registry: Arc<Registry>, config: Config) -> Self {
        let permission_checker = if config.security.enabled {
            Some(Arc::new(PermissionChecker::new(&config.security)))
        } else {
            None
        };
        Self {
            registry,
            config,
            permission_checker,
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
        };

        let mut router = Router::new()
            .merge(global_routes())
            .merge(scoped_routes())
            .nest("/contexts/:context", scoped_routes())
            .with_state(state);

        if let Some(checker) = &self.permission_checker {
            router = router
                .layer(axum::middleware::from_fn(audit_middleware))
                .layer(axum::middleware::from_fn_with_state(checker.clone(), auth_middleware));
        }

        router
            .layer(cors_layer(&self.config.server.cors))
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(self.config.server.max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(handle_transport_error))
                    .layer(TimeoutLayer::new(Duration::from_secs(self.config.server.request_timeout_secs))),
            )
    }

    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("schema registry listening on {addr}");
        axum::serve(listener, router).await?;
        Ok(())
    }
}
