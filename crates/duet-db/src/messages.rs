//! Conversation store: an append-only message log keyed by canonical pair.

use std::collections::HashMap;

use duet_types::models::{self, FriendshipStatus, Message, MessageStatus};
use duet_types::{Cursor, Page, PairKey};
use rusqlite::{Connection, params};
use tracing::warn;
use uuid::Uuid;

use crate::friendships::{query_friendship, upsert_on_message};
use crate::models::{MESSAGE_COLUMNS, message_from_row, uuid_at};
use crate::{Database, DbError, Result};

impl Database {
    /// Append a message without touching the friendship aggregate.
    pub fn append_message(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> Result<Message> {
        let pair = pair_of(sender_id, receiver_id)?;
        self.with_conn(|conn| append(conn, pair, sender_id, receiver_id, content))
    }

    /// Append a message and point the pair's aggregate at it, atomically.
    ///
    /// The friendship is checked inside the same transaction, so a block
    /// that lands first is always seen. A pair without an accepted
    /// friendship gets `NotFriends` and nothing is written. If the
    /// aggregate update still matches no row the insert is rolled back and
    /// the caller gets `NotFound("friendship")`.
    pub fn send_message(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> Result<Message> {
        let pair = pair_of(sender_id, receiver_id)?;
        self.with_tx(|conn| {
            match query_friendship(conn, pair)? {
                Some(f) if f.status == FriendshipStatus::Accepted => {}
                _ => return Err(DbError::NotFriends),
            }

            let message = append(conn, pair, sender_id, receiver_id, content)?;
            if !upsert_on_message(conn, pair, message.id, message.created_at)? {
                warn!(%sender_id, %receiver_id, "friendship vanished mid-send, rolling back");
                return Err(DbError::NotFound("friendship"));
            }
            Ok(message)
        })
    }

    /// Messages between the two members of `pair`, newest first.
    pub fn list_between(&self, pair: PairKey, cursor: Option<Cursor>, limit: usize) -> Result<Page<Message>> {
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE user_lo = ?1 AND user_hi = ?2
                   AND (?3 IS NULL OR created_at < ?3 OR (created_at = ?3 AND id < ?4))
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?5"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        pair.lo().to_string(),
                        pair.hi().to_string(),
                        cursor.map(|c| c.at.timestamp_millis()),
                        cursor.map(|c| c.id.to_string()),
                        (limit + 1) as i64,
                    ],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(Page::from_overfetch(rows, limit, |m| Cursor::new(m.created_at, m.id)))
    }

    /// Unread message counts addressed to `receiver_id`, per sender.
    ///
    /// Senders with nothing unread are absent from the map.
    pub fn count_unread_from(&self, receiver_id: Uuid, sender_ids: &[Uuid]) -> Result<HashMap<Uuid, u64>> {
        if sender_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (3..sender_ids.len() + 3).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND status = ?2 AND sender_id IN ({})
                 GROUP BY sender_id",
                placeholders.join(", ")
            );

            let mut bind: Vec<String> = vec![receiver_id.to_string(), MessageStatus::Unread.as_str().to_string()];
            bind.extend(sender_ids.iter().map(Uuid::to_string));

            let mut stmt = conn.prepare(&sql)?;
            let counts = stmt
                .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                    Ok((uuid_at(row, 0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;

            Ok(counts)
        })
    }

    /// Mark everything `sender_id` sent to `receiver_id` as read.
    pub fn mark_read(&self, receiver_id: Uuid, sender_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE messages SET status = ?3
                 WHERE receiver_id = ?1 AND sender_id = ?2 AND status = ?4",
                params![
                    receiver_id.to_string(),
                    sender_id.to_string(),
                    MessageStatus::Read.as_str(),
                    MessageStatus::Unread.as_str()
                ],
            )?)
        })
    }
}

fn pair_of(sender_id: Uuid, receiver_id: Uuid) -> Result<PairKey> {
    Ok(PairKey::new(sender_id, receiver_id)?)
}

fn append(
    conn: &Connection,
    pair: PairKey,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: &str,
) -> Result<Message> {
    let message = Message {
        id: Uuid::now_v7(),
        sender_id,
        receiver_id,
        content: Some(content.to_string()),
        attachment: None,
        status: MessageStatus::Unread,
        created_at: models::now(),
    };

    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, user_lo, user_hi, content, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            message.id.to_string(),
            sender_id.to_string(),
            receiver_id.to_string(),
            pair.lo().to_string(),
            pair.hi().to_string(),
            message.content,
            message.status.as_str(),
            message.created_at.timestamp_millis(),
        ],
    )?;

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, friends, user};
    use std::sync::Arc;

    #[test]
    fn send_updates_aggregate() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = friends(&db, &a, &b);

        let msg = db.send_message(a.id, b.id, "hello").unwrap();
        assert_eq!(msg.status, MessageStatus::Unread);

        let f = db.get_friendship(pair).unwrap().unwrap();
        assert_eq!(f.last_message_id, Some(msg.id));
        assert_eq!(f.last_message_at, msg.created_at);
    }

    #[test]
    fn send_without_friendship_writes_nothing() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        let err = db.send_message(a.id, b.id, "hello?").unwrap_err();
        assert!(matches!(err, DbError::NotFriends));

        let page = db.list_between(PairKey::new(a.id, b.id).unwrap(), None, 20).unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn send_after_block_writes_nothing() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = friends(&db, &a, &b);
        let before = db.get_friendship(pair).unwrap().unwrap();

        db.set_friendship_status(pair, FriendshipStatus::Blocked, b.id).unwrap();

        let err = db.send_message(a.id, b.id, "still there?").unwrap_err();
        assert!(matches!(err, DbError::NotFriends));
        assert!(db.list_between(pair, None, 20).unwrap().items.is_empty());

        let after = db.get_friendship(pair).unwrap().unwrap();
        assert_eq!(after.last_message_id, before.last_message_id);
        assert_eq!(after.last_message_at, before.last_message_at);
    }

    #[test]
    fn append_leaves_aggregate_alone() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = friends(&db, &a, &b);
        let before = db.get_friendship(pair).unwrap().unwrap();

        let msg = db.append_message(a.id, b.id, "quiet").unwrap();
        assert_eq!(msg.status, MessageStatus::Unread);
        assert_eq!(msg.content.as_deref(), Some("quiet"));

        let page = db.list_between(pair, None, 20).unwrap();
        assert_eq!(page.items, vec![msg]);

        let after = db.get_friendship(pair).unwrap().unwrap();
        assert_eq!(after.last_message_id, None);
        assert_eq!(after.last_message_at, before.last_message_at);
    }

    #[test]
    fn twenty_five_messages_split_into_two_pages() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = friends(&db, &a, &b);

        let sent: Vec<Message> = (0..25)
            .map(|i| db.send_message(a.id, b.id, &format!("msg {i}")).unwrap())
            .collect();

        let first = db.list_between(pair, None, 20).unwrap();
        assert_eq!(first.items.len(), 20);
        assert!(first.has_more);
        assert_eq!(first.items[0].id, sent[24].id);
        let cursor = first.next_cursor.unwrap();
        assert_eq!(cursor.id, first.items[19].id);

        let second = db.list_between(pair, Some(cursor), 20).unwrap();
        assert_eq!(second.items.len(), 5);
        assert!(!second.has_more);
        assert!(second.next_cursor.is_none());

        let walked: Vec<Uuid> = first.items.iter().chain(&second.items).map(|m| m.id).collect();
        let expected: Vec<Uuid> = sent.iter().rev().map(|m| m.id).collect();
        assert_eq!(walked, expected);
    }

    #[test]
    fn conversation_includes_both_directions_only() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");
        let ab = friends(&db, &a, &b);
        friends(&db, &a, &c);

        db.send_message(a.id, b.id, "a->b").unwrap();
        db.send_message(b.id, a.id, "b->a").unwrap();
        db.send_message(a.id, c.id, "a->c").unwrap();

        let page = db.list_between(ab, None, 10).unwrap();
        let texts: Vec<_> = page.items.iter().filter_map(|m| m.content.as_deref()).collect();
        assert_eq!(texts, vec!["b->a", "a->b"]);
    }

    #[test]
    fn unread_counts_skip_senders_with_none() {
        let db = db();
        let me = user(&db, "me");
        let b = user(&db, "bob");
        let c = user(&db, "carol");
        friends(&db, &me, &b);
        friends(&db, &me, &c);

        for _ in 0..3 {
            db.send_message(b.id, me.id, "ping").unwrap();
        }
        db.send_message(me.id, c.id, "outgoing does not count").unwrap();

        let counts = db.count_unread_from(me.id, &[b.id, c.id]).unwrap();
        assert_eq!(counts.get(&b.id), Some(&3));
        assert!(!counts.contains_key(&c.id));

        assert_eq!(db.mark_read(me.id, b.id).unwrap(), 3);
        assert!(db.count_unread_from(me.id, &[b.id]).unwrap().is_empty());
    }

    #[test]
    fn concurrent_sends_leave_a_consistent_aggregate() {
        let db = Arc::new(db());
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let pair = friends(&db, &a, &b);

        let handles: Vec<_> = [(a.id, b.id), (b.id, a.id)]
            .into_iter()
            .map(|(from, to)| {
                let db = db.clone();
                std::thread::spawn(move || db.send_message(from, to, "race").unwrap())
            })
            .collect();
        let sent: Vec<Message> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let page = db.list_between(pair, None, 10).unwrap();
        assert_eq!(page.items.len(), 2);

        let f = db.get_friendship(pair).unwrap().unwrap();
        let winner = sent
            .iter()
            .find(|m| Some(m.id) == f.last_message_id)
            .expect("aggregate points at one of the sent messages");
        assert_eq!(f.last_message_at, winner.created_at);
    }
}
