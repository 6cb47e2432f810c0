use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::core::ChatError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Chat workflow error: {0}")]
    Workflow(#[from] ChatError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Workflow(ref e) => {
                tracing::error!("Chat workflow error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Chat workflow failed".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
