pub mod auth;
pub mod error;
pub mod rest;

use std::sync::Arc;

use axum::extract::MatchedPath;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use draugnet_core::ShareService;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use auth::{AccessPolicy, OpenAccess};

pub struct AppState {
    pub share: ShareService,
    pub access: Arc<dyn AccessPolicy>,
}

impl AppState {
    pub fn new(share: ShareService) -> Self {
        Self {
            share,
            access: Arc::new(OpenAccess),
        }
    }

    pub fn with_access(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(rest::index))
        .route("/share", get(rest::share_formats))
        .route("/share/misp", post(rest::share::share_misp))
        .route("/share/misp/{token}", post(rest::share::share_misp_token))
        .route("/share/raw", post(rest::share::share_raw))
        .route("/share/raw/{token}", put(rest::share::update_raw))
        .route("/share/objects", post(rest::share::share_objects))
        .route("/share/objects/{token}", post(rest::share::share_objects_token))
        .route(
            "/retrieve",
            get(rest::retrieve::retrieve_by_query).post(rest::retrieve::retrieve_by_body),
        )
        .route(
            "/retrieve/{token}",
            get(rest::retrieve::retrieve_by_path).post(rest::retrieve::retrieve_by_path_post),
        )
        .route("/timestamp/{token}", get(rest::retrieve::timestamp))
        .route("/object_templates", get(rest::templates::object_templates))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        // Route templates only: concrete paths carry submission tokens.
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let route = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str)
                    .unwrap_or("unmatched");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    route = %route,
                )
            }),
        )
}

/// CORS for the submission front-end. `*` allows any origin without
/// credentials; an explicit list allows credentials for those origins. An
/// empty list allows no cross-origin callers.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
