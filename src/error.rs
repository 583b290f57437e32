use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use catalog_proto::{CursorDecodeError, ErrorBody};
use tracing::{debug, error};

use crate::{collection::CollectionError, paginator::PaginatorError};

/// Any failure that reaches a handler boundary. Converted into a JSON error
/// body instead of propagating further.
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: anyhow::Error::msg(message.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            error!("request failed: {:#}", self.error);
        } else {
            debug!(status = %self.status, "request rejected: {:#}", self.error);
        }
        let body = ErrorBody {
            error: format!("{:#}", self.error),
        };
        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        Self {
            status: classify(&error),
            error,
        }
    }
}

fn classify(error: &anyhow::Error) -> StatusCode {
    if let Some(err) = error.downcast_ref::<PaginatorError>() {
        return match err {
            PaginatorError::Busy => StatusCode::CONFLICT,
            PaginatorError::NotFound(_) => StatusCode::NOT_FOUND,
            PaginatorError::Collection(err) => classify_collection(err),
        };
    }
    if let Some(err) = error.downcast_ref::<CollectionError>() {
        return classify_collection(err);
    }
    if error.downcast_ref::<CursorDecodeError>().is_some() {
        return StatusCode::BAD_REQUEST;
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

fn classify_collection(err: &CollectionError) -> StatusCode {
    match err {
        CollectionError::CursorMismatch { .. } => StatusCode::BAD_REQUEST,
        CollectionError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use catalog_proto::record::Direction;

    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(AppError::from(PaginatorError::Busy).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(PaginatorError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        let mismatch = CollectionError::CursorMismatch {
            cursor: Direction::Ascending,
            query: Direction::Descending,
        };
        assert_eq!(
            AppError::from(PaginatorError::from(mismatch)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::from(CursorDecodeError).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(anyhow::anyhow!("disk on fire")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
