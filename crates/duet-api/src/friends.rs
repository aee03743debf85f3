use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use duet_db::Database;
use duet_types::api::{FriendEntry, FriendListResponse, FriendRequestEntry, PageQuery};
use duet_types::models::{Friendship, FriendshipStatus, User};
use duet_types::{Cursor, Page, PairKey};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::pagination::page_params;

pub const DEFAULT_FRIEND_PAGE: usize = 10;

/// One page of `user_id`'s accepted friends, most recently messaged first,
/// each annotated with the number of unread messages they sent.
pub fn list_friends(
    db: &Database,
    user_id: Uuid,
    cursor: Option<Cursor>,
    limit: usize,
) -> ApiResult<Page<FriendEntry>> {
    let page = db.list_accepted(user_id, cursor, limit)?;
    let friend_ids: Vec<Uuid> = page.items.iter().map(|f| f.other_member(user_id)).collect();

    // Both batch lookups come back unordered; merge by id against the page order.
    let mut users: HashMap<Uuid, User> = db
        .get_users(&friend_ids)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    let unread = db.count_unread_from(user_id, &friend_ids)?;

    let mut entries = Vec::with_capacity(friend_ids.len());
    for id in &friend_ids {
        match users.remove(id) {
            Some(user) => entries.push(FriendEntry {
                user,
                unread_count: unread.get(id).copied().unwrap_or(0),
            }),
            None => warn!(friend_id = %id, "friendship references a missing user"),
        }
    }

    Ok(Page {
        items: entries,
        has_more: page.has_more,
        next_cursor: page.next_cursor,
    })
}

pub async fn get_friends(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (cursor, limit) = page_params(&query, DEFAULT_FRIEND_PAGE)?;

    let page = tokio::task::spawn_blocking(move || list_friends(&state.db, auth.id, cursor, limit)).await??;

    Ok(Json(FriendListResponse::from(page)))
}

pub async fn get_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let requests = tokio::task::spawn_blocking(move || {
        let pending = state.db.list_incoming_requests(auth.id)?;
        let ids: Vec<Uuid> = pending.iter().map(|f| f.other_member(auth.id)).collect();
        let mut users: HashMap<Uuid, User> = state.db.get_users(&ids)?.into_iter().map(|u| (u.id, u)).collect();

        Ok::<_, ApiError>(
            pending
                .iter()
                .filter_map(|f| {
                    users.remove(&f.other_member(auth.id)).map(|user| FriendRequestEntry {
                        user,
                        requested_at: f.created_at,
                    })
                })
                .collect::<Vec<_>>(),
        )
    })
    .await??;

    Ok(Json(serde_json::json!({ "requests": requests })))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(target_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let pair = PairKey::new(auth.id, target_id)?;

    let friendship = tokio::task::spawn_blocking(move || -> ApiResult<Friendship> {
        if state.db.get_user(target_id)?.is_none() {
            return Err(ApiError::NotFound("user"));
        }
        Ok(state.db.create_friendship(pair, auth.id)?)
    })
    .await??;

    info!(from = %auth.id, to = %target_id, "friend request sent");
    Ok((StatusCode::CREATED, Json(friendship)))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(target_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    change_status(state, auth, target_id, FriendshipStatus::Accepted).await
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(target_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    change_status(state, auth, target_id, FriendshipStatus::Rejected).await
}

pub async fn block(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(target_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    change_status(state, auth, target_id, FriendshipStatus::Blocked).await
}

async fn change_status(
    state: AppState,
    auth: AuthUser,
    target_id: Uuid,
    next: FriendshipStatus,
) -> ApiResult<impl IntoResponse> {
    let pair = PairKey::new(auth.id, target_id)?;
    let actor = auth.id;

    let friendship =
        tokio::task::spawn_blocking(move || state.db.set_friendship_status(pair, next, actor)).await??;

    Ok(Json(friendship))
}
