//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP surface and
//! the gateway core modules, along with a mapper to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::{Display, Formatter};

use crate::indexes::TrieError;
use crate::sessions::SessionError;
use crate::users::UserStoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn io(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Io { .. } => 502,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

/// Token and store failures both surface as unauthenticated to clients; the
/// code string keeps the variants distinguishable for callers and logs.
impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match &err {
            SessionError::NoToken => AppError::auth("no_token", err.to_string()),
            SessionError::InvalidScheme => AppError::auth("invalid_scheme", err.to_string()),
            SessionError::MalformedToken => AppError::auth("malformed_token", err.to_string()),
            SessionError::InvalidSignature => AppError::auth("invalid_signature", err.to_string()),
            SessionError::StateNotFound => AppError::auth("session_not_found", err.to_string()),
            SessionError::EmptyKey | SessionError::Generation(_) => {
                AppError::internal("token_generation", err.to_string())
            }
            SessionError::Store(_) => AppError::io("session_store", err.to_string()),
            SessionError::Codec(_) => AppError::internal("session_codec", err.to_string()),
        }
    }
}

impl From<UserStoreError> for AppError {
    fn from(err: UserStoreError) -> Self {
        match &err {
            UserStoreError::NotFound => AppError::not_found("user_not_found", err.to_string()),
            UserStoreError::Invalid(_) => AppError::user("invalid_user", err.to_string()),
            UserStoreError::Backend(_) => AppError::io("user_store", err.to_string()),
        }
    }
}

impl From<TrieError> for AppError {
    fn from(err: TrieError) -> Self {
        AppError::internal("index", err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "status": "error",
            "code": self.code_str(),
            "error": self.message(),
        }));
        (status, body).into_response()
    }
}
