//! HTTP handlers for ad operations.

use super::{Empty, MutationResponse, parse_id};
use crate::{errors::AppError, models::ad::Ad, state::AppState};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct CreatedAd {
    pub id: i64,
}

/// `POST /ad` — create an ad, returning its id.
pub async fn post_ad(
    State(state): State<AppState>,
    payload: Result<Json<Ad>, JsonRejection>,
) -> Result<Json<MutationResponse<CreatedAd>>, AppError> {
    let Json(ad) = payload.map_err(invalid_body)?;
    let id = state.service.post_ad(ad).await?;
    Ok(Json(MutationResponse::ok(CreatedAd { id })))
}

/// `PUT /ad` — update the ad named by the body's `id`.
pub async fn put_ad(
    State(state): State<AppState>,
    payload: Result<Json<Ad>, JsonRejection>,
) -> Result<Json<MutationResponse<Empty>>, AppError> {
    let Json(ad) = payload.map_err(invalid_body)?;
    state.service.put_ad(ad).await?;
    Ok(Json(MutationResponse::ok(Empty::default())))
}

/// `DELETE /ad/{id}`
pub async fn delete_ad(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MutationResponse<Empty>>, AppError> {
    let id = parse_id(&id)?;
    state.service.delete_ad(id).await?;
    Ok(Json(MutationResponse::ok(Empty::default())))
}

fn invalid_body(rejection: JsonRejection) -> AppError {
    debug!("rejected request body: {}", rejection.body_text());
    AppError::bad_request("invalid request body")
}
