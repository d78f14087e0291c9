use axum::{
    http::{header, HeaderValue, Method},
    routing::{any, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::handlers::{healthz, readyz, track_conversion};
use crate::state::AppState;

const VERSIONED_RELAY_PATH: &str = "/v1/track-conversion";

pub fn build_router(state: AppState) -> Router {
    // The dev server serves the page from another origin, so every reply
    // must be readable cross-origin, errors included.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(&state.config.relay_path, any(track_conversion));
    if state.config.relay_path != VERSIONED_RELAY_PATH {
        router = router.route(VERSIONED_RELAY_PATH, any(track_conversion));
    }

    router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
