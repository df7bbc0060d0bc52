//! HTTP handlers for photo operations.
//! The uploaded file is streamed straight from the multipart body into the
//! service without buffering it in memory.

use super::{Empty, MutationResponse, parse_id, request_id};
use crate::{
    errors::AppError,
    models::photo::Photo,
    services::ad_service::{PhotoUpload, ServiceError},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, StatusCode},
};
use futures::StreamExt;
use std::io;
use tracing::debug;

/// Name of the multipart field holding the file.
pub const PHOTO_FIELD: &str = "photo";

/// `POST /ad/{id}/photo` — upload a photo from the `photo` multipart field.
pub async fn post_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MutationResponse<Photo>>, AppError> {
    let ad_id = parse_id(&id)?;
    let mut multipart = multipart.map_err(|rejection| {
        debug!("rejected multipart body: {}", rejection.body_text());
        AppError::from(ServiceError::MissingFields)
    })?;
    let request_id = request_id(&headers);

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ServiceError::MissingFields.into()),
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                debug!("multipart body over limit: {}", err);
                return Err(AppError::payload_too_large());
            }
            Err(err) => {
                debug!("malformed multipart body: {}", err);
                return Err(ServiceError::MissingFields.into());
            }
        };
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }

        let upload = PhotoUpload {
            content_type: field.content_type().map(str::to_string),
            body: field.map(|chunk| chunk.map_err(read_error)).boxed(),
        };
        let photo = state.service.post_photo(ad_id, upload, &request_id).await?;
        return Ok(Json(MutationResponse::ok(photo)));
    }
}

/// `DELETE /ad/{id}/photo/{photo_id}`
pub async fn delete_photo(
    State(state): State<AppState>,
    Path((ad_id, id)): Path<(String, String)>,
) -> Result<Json<MutationResponse<Empty>>, AppError> {
    let ad_id = parse_id(&ad_id)?;
    let id = parse_id(&id)?;
    state.service.delete_photo(ad_id, id).await?;
    Ok(Json(MutationResponse::ok(Empty::default())))
}

/// Keep "body too large" distinguishable once the error leaves axum.
fn read_error(err: MultipartError) -> io::Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        io::Error::new(io::ErrorKind::FileTooLarge, err)
    } else {
        io::Error::other(err)
    }
}
