use duet_types::models::FriendshipStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("the two users are not friends")]
    NotFriends,

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("cannot change friendship from {from} to {to}")]
    InvalidTransition {
        from: FriendshipStatus,
        to: FriendshipStatus,
    },

    #[error(transparent)]
    Pair(#[from] duet_types::PairKeyError),

    #[error("database lock poisoned")]
    Poisoned,
}

/// Map a UNIQUE / PRIMARY KEY violation to `Conflict`, pass anything else through.
pub(crate) fn unique_violation(err: rusqlite::Error, what: &'static str) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DbError::Conflict(what)
        }
        _ => DbError::Sqlite(err),
    }
}
