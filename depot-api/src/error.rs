use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use depot_core::error::DomainError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    Anyhow(anyhow::Error),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl ApiError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ApiError::Domain(DomainError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            ApiError::Domain(DomainError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg),
            ApiError::Domain(DomainError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(DomainError::Conflict(msg)) => (StatusCode::CONFLICT, msg),
            ApiError::Domain(DomainError::InvalidState(msg)) => (StatusCode::CONFLICT, msg),
            ApiError::Domain(DomainError::Internal(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            ApiError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: DomainError) -> StatusCode {
        ApiError::from(err).status_and_message().0
    }

    #[test]
    fn domain_errors_map_to_expected_status_codes() {
        assert_eq!(
            status_of(DomainError::not_found("x")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::forbidden("x")),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(DomainError::validation("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(DomainError::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(
            status_of(DomainError::invalid_state("x")),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_errors_are_opaque() {
        let (status, message) =
            ApiError::from(DomainError::internal("connection refused")).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal Server Error");
    }

    #[test]
    fn business_error_messages_pass_through() {
        let (_, message) =
            ApiError::from(DomainError::conflict("product already in order")).status_and_message();
        assert_eq!(message, "product already in order");
    }
}
