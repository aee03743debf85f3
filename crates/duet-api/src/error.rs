use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use duet_db::DbError;
use duet_types::api::ErrorBody;
use duet_types::models::FriendshipStatus;
use duet_types::{CursorError, PairKeyError};

/// Outcome kinds surfaced to clients.
///
/// `Storage` carries detail for the log only; clients see a generic 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unauthorized")]
    Unauthorized,

    #[error("access denied: you are not friends with this user")]
    Forbidden,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    #[error("cannot change friendship from {from} to {to}")]
    InvalidTransition {
        from: FriendshipStatus,
        to: FriendshipStatus,
    },

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("storage failure: {0}")]
    Storage(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) | Self::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            Self::InvalidTransition { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Self::NotFound(what),
            DbError::NotFriends => Self::Forbidden,
            DbError::Conflict(what) => Self::Conflict(what),
            DbError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            DbError::Pair(e) => e.into(),
            DbError::Sqlite(_) | DbError::Poisoned => Self::storage(err),
        }
    }
}

impl From<PairKeyError> for ApiError {
    fn from(err: PairKeyError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("spawn_blocking join error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Storage(detail) => {
                error!("{}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}
