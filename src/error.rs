use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::users::services::RegisterError;

pub const MSG_REQUIRED_FIELDS: &str = "Nome, E-mail e Senha são obrigatórios";
pub const MSG_INVALID_BODY: &str = "Corpo da requisição inválido";
pub const MSG_EMAIL_TAKEN: &str = "E-mail já cadastrado";
pub const MSG_CREATE_FAILED: &str = "Erro ao criar usuário.";

/// Errors surfaced at the HTTP boundary. Every variant renders `{ "erro": .. }`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// `public` goes to the client, `source` only to the log.
    #[error("internal error: {source}")]
    Internal {
        public: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegisterError> for AppError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::MissingFields => AppError::Validation(MSG_REQUIRED_FIELDS.into()),
            RegisterError::EmailTaken => AppError::Conflict(MSG_EMAIL_TAKEN.into()),
            other => AppError::Internal {
                public: MSG_CREATE_FAILED,
                source: other.into(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(msg) | AppError::Conflict(msg) => msg,
            AppError::Internal { public, source } => {
                error!(error = ?source, "request failed");
                public.to_string()
            }
        };
        (status, Json(json!({ "erro": message }))).into_response()
    }
}
