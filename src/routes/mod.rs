//! API routes

mod error;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::AppState;

pub use error::ApiError;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Body of `POST /chat`
///
/// Fields are not validated. Missing or `null` values become `None`; any other
/// non-string JSON value is kept as its JSON text.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "userId", default, deserialize_with = "loose_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub message: Option<String>,
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        },
    )
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .chat_workflow
        .run(request.user_id.as_deref(), request.message.as_deref())
        .await?;

    Ok(Json(ChatResponse { reply }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
}
