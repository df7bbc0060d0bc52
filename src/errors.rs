use crate::services::{ad_service::ServiceError, object_uploader::UploadError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};

/// An error ready to be sent to the client: a status and a top-level message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// 413, for request bodies over the configured limit.
    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "payload too large")
    }
}

/// HTTP status for each kind of service failure.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound => StatusCode::NOT_FOUND,
        ServiceError::AlreadyExists
        | ServiceError::InconsistentIds
        | ServiceError::MissingFields
        | ServiceError::BadRouting => StatusCode::BAD_REQUEST,
        ServiceError::Upload(UploadError::Read(err)) if err.kind() == io::ErrorKind::FileTooLarge => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        ServiceError::Upload(_)
        | ServiceError::Processing(_)
        | ServiceError::ProcessorUnavailable(_)
        | ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match status_for(&err) {
            StatusCode::PAYLOAD_TOO_LARGE => AppError::payload_too_large(),
            status => AppError::new(status, err.to_string()),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        ad_store::StoreError, image_processor::ProcessorError, object_uploader::UploadError,
    };
    use http_body_util::BodyExt;
    use std::time::Duration;

    #[test]
    fn taxonomy_maps_onto_status_codes() {
        let cases = [
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (ServiceError::AlreadyExists, StatusCode::BAD_REQUEST),
            (ServiceError::InconsistentIds, StatusCode::BAD_REQUEST),
            (ServiceError::MissingFields, StatusCode::BAD_REQUEST),
            (ServiceError::BadRouting, StatusCode::BAD_REQUEST),
            (
                ServiceError::Upload(UploadError::TimedOut(Duration::from_secs(50))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Processing("bad image".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::ProcessorUnavailable(ProcessorError::TimedOut(Duration::from_secs(
                    10,
                ))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Store(StoreError::Sqlx(sqlx::Error::PoolClosed)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{:?}", err);
        }
    }

    #[test]
    fn oversized_upload_body_is_payload_too_large() {
        let err = ServiceError::Upload(UploadError::Read(io::Error::new(
            io::ErrorKind::FileTooLarge,
            "length limit exceeded",
        )));
        let app_err = AppError::from(err);
        assert_eq!(app_err.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(app_err.message, "payload too large");

        let err = ServiceError::Upload(UploadError::Read(io::Error::other("reset")));
        assert_eq!(AppError::from(err).status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_causes_stay_out_of_the_message() {
        let err = AppError::from(ServiceError::Upload(UploadError::Transfer {
            key: "1-2-3".into(),
            reason: "SignatureDoesNotMatch".into(),
        }));
        assert_eq!(err.message, "upload failed");

        let err = AppError::from(ServiceError::Store(StoreError::Sqlx(
            sqlx::Error::PoolTimedOut,
        )));
        assert_eq!(err.message, "database error");
    }

    #[tokio::test]
    async fn body_is_a_bare_error_envelope() {
        let response = AppError::from(ServiceError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({ "error": "not found" }));
    }
}
