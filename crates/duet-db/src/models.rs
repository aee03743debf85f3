//! Row mapping between SQLite columns and duet-types models.
//!
//! Ids are stored as hyphenated TEXT and timestamps as unix milliseconds.

use std::str::FromStr;

use duet_types::models::{Friendship, Message, User, from_millis};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

/// A user together with the stored credential hash.
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

pub(crate) const USER_COLUMNS: &str =
    "id, full_name, email, bio, profile_pic, status, created_at, password";

pub(crate) const FRIENDSHIP_COLUMNS: &str =
    "id, user_lo, user_hi, status, action_by, last_message_id, last_message_at, created_at";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, attachment, status, created_at";

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => Uuid::parse_str(&raw).map(Some).map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

fn enum_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        bio: row.get(3)?,
        profile_pic: row.get(4)?,
        status: enum_at(row, 5)?,
        created_at: from_millis(row.get(6)?),
    })
}

pub(crate) fn user_record_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        user: user_from_row(row)?,
        password_hash: row.get(7)?,
    })
}

pub(crate) fn friendship_from_row(row: &Row<'_>) -> rusqlite::Result<Friendship> {
    Ok(Friendship {
        id: uuid_at(row, 0)?,
        user_lo: uuid_at(row, 1)?,
        user_hi: uuid_at(row, 2)?,
        status: enum_at(row, 3)?,
        action_by: uuid_at(row, 4)?,
        last_message_id: opt_uuid_at(row, 5)?,
        last_message_at: from_millis(row.get(6)?),
        created_at: from_millis(row.get(7)?),
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        receiver_id: uuid_at(row, 2)?,
        content: row.get(3)?,
        attachment: row.get(4)?,
        status: enum_at(row, 5)?,
        created_at: from_millis(row.get(6)?),
    })
}
