use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use duet_db::Database;
use duet_types::api::{MarkReadResponse, MessageListResponse, PageQuery, SendMessageRequest};
use duet_types::models::{FriendshipStatus, Message};
use duet_types::{Cursor, Page, PairKey};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::pagination::page_params;

pub const DEFAULT_MESSAGE_PAGE: usize = 20;
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Require an accepted friendship between the two users.
fn ensure_friends(db: &Database, pair: PairKey) -> ApiResult<()> {
    match db.get_friendship(pair)? {
        Some(f) if f.status == FriendshipStatus::Accepted => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

/// One page of the conversation between `user_id` and `friend_id`, newest first.
pub fn list_messages(
    db: &Database,
    user_id: Uuid,
    friend_id: Uuid,
    cursor: Option<Cursor>,
    limit: usize,
) -> ApiResult<Page<Message>> {
    let pair = PairKey::new(user_id, friend_id)?;
    ensure_friends(db, pair)?;
    Ok(db.list_between(pair, cursor, limit)?)
}

/// Store a message and update the pair's friend-list ordering in one transaction.
///
/// The accepted-friendship check runs inside that transaction; a pair that
/// is not (or no longer) friends gets `Forbidden`.
pub fn send(db: &Database, sender_id: Uuid, friend_id: Uuid, text: &str) -> ApiResult<Message> {
    PairKey::new(sender_id, friend_id)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::invalid("Message text is required"));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::invalid(format!(
            "Message text must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(db.send_message(sender_id, friend_id, text)?)
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(friend_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (cursor, limit) = page_params(&query, DEFAULT_MESSAGE_PAGE)?;

    let page =
        tokio::task::spawn_blocking(move || list_messages(&state.db, auth.id, friend_id, cursor, limit)).await??;

    Ok(Json(MessageListResponse::from(page)))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(friend_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = tokio::task::spawn_blocking(move || send(&state.db, auth.id, friend_id, &req.text)).await??;

    debug!(message_id = %message.id, "message stored");
    // TODO: push to the receiver once a realtime gateway exists.
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(friend_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let pair = PairKey::new(auth.id, friend_id)?;

    let updated = tokio::task::spawn_blocking(move || {
        ensure_friends(&state.db, pair)?;
        Ok::<_, ApiError>(state.db.mark_read(auth.id, friend_id)?)
    })
    .await??;

    Ok(Json(MarkReadResponse { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_types::models::User;

    fn user(db: &Database, name: &str) -> User {
        db.create_user(name, &format!("{name}@example.com"), "h").unwrap()
    }

    #[test]
    fn strangers_cannot_message_or_read() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        assert!(matches!(send(&db, a.id, b.id, "hi"), Err(ApiError::Forbidden)));
        assert!(matches!(list_messages(&db, a.id, b.id, None, 20), Err(ApiError::Forbidden)));

        // A pending request is not enough either.
        db.create_friendship(PairKey::new(a.id, b.id).unwrap(), a.id).unwrap();
        assert!(matches!(send(&db, a.id, b.id, "hi"), Err(ApiError::Forbidden)));
    }

    #[test]
    fn blocked_friend_cannot_be_messaged() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = PairKey::new(a.id, b.id).unwrap();
        db.create_friendship(pair, a.id).unwrap();
        db.set_friendship_status(pair, FriendshipStatus::Accepted, b.id).unwrap();
        send(&db, a.id, b.id, "before").unwrap();

        db.set_friendship_status(pair, FriendshipStatus::Blocked, b.id).unwrap();
        assert!(matches!(send(&db, a.id, b.id, "after"), Err(ApiError::Forbidden)));

        let stored = db.list_between(pair, None, 10).unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].content.as_deref(), Some("before"));
    }

    #[test]
    fn self_conversation_is_invalid() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        assert!(matches!(send(&db, a.id, a.id, "me"), Err(ApiError::InvalidArgument(_))));
        assert!(matches!(
            list_messages(&db, a.id, a.id, None, 20),
            Err(ApiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn blank_or_oversized_text_is_rejected_before_writing() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = PairKey::new(a.id, b.id).unwrap();
        db.create_friendship(pair, a.id).unwrap();
        db.set_friendship_status(pair, FriendshipStatus::Accepted, b.id).unwrap();

        assert!(matches!(send(&db, a.id, b.id, "   "), Err(ApiError::InvalidArgument(_))));
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(send(&db, a.id, b.id, &long), Err(ApiError::InvalidArgument(_))));
        assert!(db.list_between(pair, None, 5).unwrap().items.is_empty());

        let sent = send(&db, a.id, b.id, "  padded  ").unwrap();
        assert_eq!(sent.content.as_deref(), Some("padded"));
    }
}
