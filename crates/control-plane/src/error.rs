use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors the HTTP layer can surface. User-visible failures are structured
/// error objects (code, message, details), never raw engine or database
/// error text.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] persistence::DbError),
    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Database(persistence::DbError::NotFound) => {
                (StatusCode::NOT_FOUND, "not_found", "the requested resource was not found".to_string())
            }
            AppError::Database(e) => {
                tracing::error!(error = ?e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", "an internal database error occurred".to_string())
            }
            AppError::Engine(engine::EngineError::BotNotFound(_)) => {
                (StatusCode::NOT_FOUND, "bot_not_found", self.to_string())
            }
            AppError::Engine(engine::EngineError::AlreadyRunning(_)) => {
                (StatusCode::CONFLICT, "bot_already_running", self.to_string())
            }
            AppError::Engine(e) => {
                tracing::error!(error = ?e, "engine error");
                (StatusCode::INTERNAL_SERVER_ERROR, "engine_error", "an internal engine error occurred".to_string())
            }
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
        };

        let body = Json(json!({ "code": code, "message": message, "details": null::<()> }));
        (status, body).into_response()
    }
}
