use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, User, UserStatus};
use crate::pagination::{Cursor, Page};

// -- JWT Claims --

/// Session token claims. Issued at signup/login and carried in the
/// session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    #[serde(alias = "fullName")]
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub profile_pic: String,
}

impl From<User> for AuthResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            profile_pic: user.profile_pic,
        }
    }
}

// -- Profile --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

// -- Pagination --

/// Query parameters shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub cursor_id: Option<String>,
    #[serde(alias = "cursorTimestamp")]
    pub cursor_created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextCursor {
    pub cursor_id: Uuid,
    pub cursor_created_at: String,
    pub cursor: String,
}

impl From<Cursor> for NextCursor {
    fn from(c: Cursor) -> Self {
        Self {
            cursor_id: c.id,
            cursor_created_at: c.at_rfc3339(),
            cursor: c.encode(),
        }
    }
}

// -- Friends --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendEntry {
    #[serde(flatten)]
    pub user: User,
    pub unread_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendListResponse {
    pub friends: Vec<FriendEntry>,
    pub has_more: bool,
    pub next_cursor: Option<NextCursor>,
}

impl From<Page<FriendEntry>> for FriendListResponse {
    fn from(page: Page<FriendEntry>) -> Self {
        Self {
            friends: page.items,
            has_more: page.has_more,
            next_cursor: page.next_cursor.map(NextCursor::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestEntry {
    #[serde(flatten)]
    pub user: User,
    pub requested_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub next_cursor: Option<NextCursor>,
}

impl From<Page<Message>> for MessageListResponse {
    fn from(page: Page<Message>) -> Self {
        Self {
            messages: page.items,
            has_more: page.has_more,
            next_cursor: page.next_cursor.map(NextCursor::from),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
