use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use seatline_core::SeatingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Seating(#[from] SeatingError),
    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Seating(err) => match err {
                SeatingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                SeatingError::SeatNotFound(_)
                | SeatingError::GroupNotFound(_)
                | SeatingError::EventNotFound(_) => StatusCode::NOT_FOUND,
                SeatingError::SeatConflict(_)
                | SeatingError::GroupAlreadyReleased(_)
                | SeatingError::CannotReleaseAllocated(_) => StatusCode::CONFLICT,
                SeatingError::HoldExpired(_) => StatusCode::GONE,
                SeatingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "INVALID_INPUT",
            AppError::Seating(err) => err.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal Server Error: {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
