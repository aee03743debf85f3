use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time truncated to whole milliseconds.
///
/// Everything persisted by duet is stored at millisecond precision, so
/// values handed out (and later echoed back in cursors) must already be
/// truncated or they would never compare equal to what was stored.
pub fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    #[default]
    Offline,
    Away,
}

string_enum!(UserStatus {
    Online => "online",
    Offline => "offline",
    Away => "away",
});

/// Public view of a user. The credential hash never leaves duet-db.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub bio: String,
    pub profile_pic: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

// -- Friendships --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Blocked,
    Rejected,
}

string_enum!(FriendshipStatus {
    Pending => "pending",
    Accepted => "accepted",
    Blocked => "blocked",
    Rejected => "rejected",
});

impl FriendshipStatus {
    /// Legal status changes. Anything not listed is refused.
    ///
    /// pending  -> accepted | rejected | blocked
    /// accepted -> blocked
    pub fn can_transition_to(self, next: FriendshipStatus) -> bool {
        use FriendshipStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted) | (Pending, Rejected) | (Pending, Blocked) | (Accepted, Blocked)
        )
    }
}

/// One record per unordered user pair; `user_lo < user_hi` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friendship {
    pub id: Uuid,
    pub user_lo: Uuid,
    pub user_hi: Uuid,
    pub status: FriendshipStatus,
    pub action_by: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    /// The member of the pair that is not `user_id`.
    pub fn other_member(&self, user_id: Uuid) -> Uuid {
        if self.user_lo == user_id {
            self.user_hi
        } else {
            self.user_lo
        }
    }

    /// Tie-break id for ordering. Friendships without any message yet
    /// fall back to their own (equally time-ordered) id.
    pub fn sort_id(&self) -> Uuid {
        self.last_message_id.unwrap_or(self.id)
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Unread,
    Read,
}

string_enum!(MessageStatus {
    Unread => "unread",
    Read => "read",
});

/// A direct message. Immutable once created apart from its read status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}
