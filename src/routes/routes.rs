//! Defines routes for the ad and photo operations.
//!
//! ## Structure
//! - **Ad endpoints**
//!   - `POST   /ad` — create an ad
//!   - `PUT    /ad` — update the ad named in the body
//!   - `DELETE /ad/{id}` — delete an ad and its photo rows
//!
//! - **Photo endpoints**
//!   - `POST   /ad/{id}/photo` — upload a photo (multipart field `photo`)
//!   - `DELETE /ad/{id}/photo/{photo_id}` — delete a photo row
//!
//! Ad and photo endpoints are nested under the configured path prefix;
//! `/healthz` and `/readyz` always live at the root.

use crate::{
    handlers::{
        REQUEST_ID_HEADER,
        ad_handlers::{delete_ad, post_ad, put_ad},
        health_handlers::{healthz, readyz},
        photo_handlers::{delete_photo, post_photo},
    },
    state::AppState,
};
use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{delete, get, post},
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Span, info_span};

/// Build the router for all endpoints.
///
/// `max_upload_bytes` caps the body of the photo upload route only.
pub fn routes(path_prefix: &str, max_upload_bytes: usize) -> Router<AppState> {
    let api = Router::new()
        .route("/ad", post(post_ad).put(put_ad))
        .route("/ad/{id}", delete(delete_ad))
        .route(
            "/ad/{id}/photo",
            post(post_photo).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/ad/{id}/photo/{photo_id}", delete(delete_photo));

    let api = if path_prefix.is_empty() {
        api
    } else {
        Router::new().nest(path_prefix, api)
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(api)
}

/// The full application: routes, state and middleware.
///
/// Every request gets an `x-request-id` (kept when the caller sent one),
/// echoed on the response and recorded on the request span.
pub fn app(state: AppState, path_prefix: &str, max_upload_bytes: usize) -> Router {
    routes(path_prefix, max_upload_bytes)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");
    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
