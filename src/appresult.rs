use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use tracing::error;

use crate::BrokerError;

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub StatusCode, pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError(status, err) = self;
        if status.is_server_error() {
            error!("{err}\n\n{}", err.backtrace());
        }
        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        let status = match err.downcast_ref::<BrokerError>() {
            Some(BrokerError::Validation(_)) => StatusCode::BAD_REQUEST,
            Some(BrokerError::Conflict(_)) => StatusCode::CONFLICT,
            Some(BrokerError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(BrokerError::NotMember(_)) => StatusCode::FORBIDDEN,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_errors_map_to_client_statuses() {
        let err: AppError = BrokerError::validation("q is required").into();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::from(BrokerError::NotFound("Room not found".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
