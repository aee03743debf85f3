//! Friendship index: one record per canonical pair, carrying the
//! denormalized last-message pointer used to order friend lists.

use chrono::{DateTime, Utc};
use duet_types::models::{self, Friendship, FriendshipStatus};
use duet_types::{Cursor, Page, PairKey};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::unique_violation;
use crate::models::{FRIENDSHIP_COLUMNS, friendship_from_row};
use crate::{Database, DbError, Result};

impl Database {
    pub fn get_friendship(&self, pair: PairKey) -> Result<Option<Friendship>> {
        self.with_conn(|conn| query_friendship(conn, pair))
    }

    /// Create a pending friendship initiated by `actor`.
    ///
    /// The unique index on the canonical pair turns a second request (or a
    /// concurrent one from the other side) into `Conflict`.
    pub fn create_friendship(&self, pair: PairKey, actor: Uuid) -> Result<Friendship> {
        if !pair.contains(actor) {
            return Err(DbError::NotFound("friendship member"));
        }

        let now = models::now();
        let friendship = Friendship {
            id: Uuid::now_v7(),
            user_lo: pair.lo(),
            user_hi: pair.hi(),
            status: FriendshipStatus::Pending,
            action_by: actor,
            last_message_id: None,
            last_message_at: now,
            created_at: now,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friendships
                    (id, user_lo, user_hi, status, action_by, last_message_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    friendship.id.to_string(),
                    friendship.user_lo.to_string(),
                    friendship.user_hi.to_string(),
                    friendship.status.as_str(),
                    actor.to_string(),
                    now.timestamp_millis(),
                    now.timestamp_millis(),
                ],
            )
            .map_err(|e| unique_violation(e, "friendship"))?;
            Ok(())
        })?;

        Ok(friendship)
    }

    /// Move a friendship to `next`, recording `actor` as the last actor.
    ///
    /// Illegal moves (see [`FriendshipStatus::can_transition_to`]) and
    /// answering one's own pending request are `InvalidTransition`.
    pub fn set_friendship_status(
        &self,
        pair: PairKey,
        next: FriendshipStatus,
        actor: Uuid,
    ) -> Result<Friendship> {
        self.with_tx(|conn| {
            let current = query_friendship(conn, pair)?.ok_or(DbError::NotFound("friendship"))?;

            let answering_own_request = current.status == FriendshipStatus::Pending
                && matches!(next, FriendshipStatus::Accepted | FriendshipStatus::Rejected)
                && current.action_by == actor;

            if !current.status.can_transition_to(next) || answering_own_request {
                return Err(DbError::InvalidTransition {
                    from: current.status,
                    to: next,
                });
            }

            conn.execute(
                "UPDATE friendships SET status = ?3, action_by = ?4
                 WHERE user_lo = ?1 AND user_hi = ?2",
                params![
                    pair.lo().to_string(),
                    pair.hi().to_string(),
                    next.as_str(),
                    actor.to_string()
                ],
            )?;

            debug!(from = %current.status, to = %next, "friendship status changed");
            Ok(Friendship {
                status: next,
                action_by: actor,
                ..current
            })
        })
    }

    /// Point the pair's aggregate at a new latest message.
    ///
    /// Last write wins. Returns `false` when no record exists for the
    /// pair, in which case nothing is written.
    pub fn upsert_on_message(&self, pair: PairKey, message_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| upsert_on_message(conn, pair, message_id, at))
    }

    /// Accepted friendships of `user_id`, most recent activity first.
    pub fn list_accepted(
        &self,
        user_id: Uuid,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Page<Friendship>> {
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
                 WHERE (user_lo = ?1 OR user_hi = ?1)
                   AND status = 'accepted'
                   AND (?2 IS NULL
                        OR last_message_at < ?2
                        OR (last_message_at = ?2 AND COALESCE(last_message_id, id) < ?3))
                 ORDER BY last_message_at DESC, COALESCE(last_message_id, id) DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        user_id.to_string(),
                        cursor.map(|c| c.at.timestamp_millis()),
                        cursor.map(|c| c.id.to_string()),
                        (limit + 1) as i64,
                    ],
                    friendship_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(Page::from_overfetch(rows, limit, |f| {
            Cursor::new(f.last_message_at, f.sort_id())
        }))
    }

    /// Pending requests waiting on `user_id` to answer.
    pub fn list_incoming_requests(&self, user_id: Uuid) -> Result<Vec<Friendship>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
                 WHERE (user_lo = ?1 OR user_hi = ?1)
                   AND status = 'pending'
                   AND action_by != ?1
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], friendship_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_friendship(conn: &Connection, pair: PairKey) -> Result<Option<Friendship>> {
    let sql = format!("SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE user_lo = ?1 AND user_hi = ?2");
    let row = conn
        .query_row(
            &sql,
            params![pair.lo().to_string(), pair.hi().to_string()],
            friendship_from_row,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn upsert_on_message(
    conn: &Connection,
    pair: PairKey,
    message_id: Uuid,
    at: DateTime<Utc>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE friendships SET last_message_id = ?3, last_message_at = ?4
         WHERE user_lo = ?1 AND user_hi = ?2",
        params![
            pair.lo().to_string(),
            pair.hi().to_string(),
            message_id.to_string(),
            at.timestamp_millis()
        ],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, friends, user};
    use std::collections::HashSet;

    #[test]
    fn one_record_per_unordered_pair() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        db.create_friendship(PairKey::new(a.id, b.id).unwrap(), a.id).unwrap();
        let err = db
            .create_friendship(PairKey::new(b.id, a.id).unwrap(), b.id)
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict("friendship")));
    }

    #[test]
    fn requester_cannot_accept_own_request() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = PairKey::new(a.id, b.id).unwrap();
        db.create_friendship(pair, a.id).unwrap();

        let err = db
            .set_friendship_status(pair, FriendshipStatus::Accepted, a.id)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));

        let accepted = db
            .set_friendship_status(pair, FriendshipStatus::Accepted, b.id)
            .unwrap();
        assert_eq!(accepted.status, FriendshipStatus::Accepted);
        assert_eq!(accepted.action_by, b.id);
        assert_eq!(db.get_friendship(pair).unwrap().unwrap(), accepted);
    }

    #[test]
    fn illegal_transitions_leave_record_untouched() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = friends(&db, &a, &b);

        let err = db
            .set_friendship_status(pair, FriendshipStatus::Pending, a.id)
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidTransition {
                from: FriendshipStatus::Accepted,
                to: FriendshipStatus::Pending
            }
        ));

        db.set_friendship_status(pair, FriendshipStatus::Blocked, a.id).unwrap();
        let err = db
            .set_friendship_status(pair, FriendshipStatus::Accepted, b.id)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));
        assert_eq!(
            db.get_friendship(pair).unwrap().unwrap().status,
            FriendshipStatus::Blocked
        );
    }

    #[test]
    fn missing_friendship_status_change_is_not_found() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = PairKey::new(a.id, b.id).unwrap();
        let err = db
            .set_friendship_status(pair, FriendshipStatus::Blocked, a.id)
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound("friendship")));
    }

    #[test]
    fn upsert_without_record_is_a_no_op() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = PairKey::new(a.id, b.id).unwrap();

        assert!(!db.upsert_on_message(pair, Uuid::now_v7(), models::now()).unwrap());
        assert!(db.get_friendship(pair).unwrap().is_none());
    }

    #[test]
    fn list_accepted_walks_every_friend_once_in_order() {
        let db = db();
        let me = user(&db, "me");
        let base = models::now();

        // Seven friends, three sharing the same activity timestamp to force id tie-breaks.
        let mut expected = Vec::new();
        for i in 0..7 {
            let friend = user(&db, &format!("friend{i}"));
            let pair = friends(&db, &me, &friend);
            let at = base - chrono::Duration::seconds(if i < 3 { 10 } else { i });
            let msg_id = Uuid::now_v7();
            // No message rows exist; the aggregate only needs the pointer.
            db.with_conn(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = OFF")?;
                upsert_on_message(conn, pair, msg_id, at)?;
                conn.execute_batch("PRAGMA foreign_keys = ON")?;
                Ok(())
            })
            .unwrap();
            expected.push((at, msg_id, friend.id));
        }
        // A pending friendship must not appear.
        let stranger = user(&db, "stranger");
        db.create_friendship(PairKey::new(me.id, stranger.id).unwrap(), stranger.id)
            .unwrap();

        expected.sort_by(|x, y| (y.0, y.1).cmp(&(x.0, x.1)));

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = db.list_accepted(me.id, cursor, 3).unwrap();
            let again = db.list_accepted(me.id, cursor, 3).unwrap();
            assert_eq!(page, again);

            seen.extend(page.items.iter().map(|f| f.other_member(me.id)));
            if !page.has_more {
                assert!(page.next_cursor.is_none());
                break;
            }
            cursor = page.next_cursor;
        }

        let expected_ids: Vec<Uuid> = expected.iter().map(|e| e.2).collect();
        assert_eq!(seen, expected_ids);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 7);
    }

    #[test]
    fn incoming_requests_exclude_outgoing() {
        let db = db();
        let me = user(&db, "me");
        let asker = user(&db, "asker");
        let asked = user(&db, "asked");
        db.create_friendship(PairKey::new(me.id, asker.id).unwrap(), asker.id).unwrap();
        db.create_friendship(PairKey::new(me.id, asked.id).unwrap(), me.id).unwrap();

        let incoming = db.list_incoming_requests(me.id).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].other_member(me.id), asker.id);
    }
}
