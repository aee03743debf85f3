//! Keyset pagination over `(timestamp desc, id desc)`.
//!
//! A [`Cursor`] names the last item of the previous page. The next page
//! holds items strictly before it:
//! `time < cursor.at OR (time = cursor.at AND id < cursor.id)`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::from_millis;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("cursor id is not a valid identifier")]
    BadId,
    #[error("cursor timestamp is not a valid instant")]
    BadTimestamp,
    #[error("cursor id and timestamp must be supplied together")]
    Partial,
    #[error("cursor token is malformed")]
    BadToken,
    #[error("supply either a cursor token or cursor fields, not both")]
    Ambiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(at: DateTime<Utc>, id: Uuid) -> Self {
        Self {
            at: from_millis(at.timestamp_millis()),
            id,
        }
    }

    /// Opaque, query-string-safe form of the cursor.
    pub fn encode(&self) -> String {
        B64.encode(format!("{}.{}", self.at.timestamp_millis(), self.id))
    }

    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let raw = B64.decode(token).map_err(|_| CursorError::BadToken)?;
        let raw = String::from_utf8(raw).map_err(|_| CursorError::BadToken)?;
        let (millis, id) = raw.split_once('.').ok_or(CursorError::BadToken)?;
        let at = millis
            .parse::<i64>()
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or(CursorError::BadTimestamp)?;
        let id = Uuid::parse_str(id).map_err(|_| CursorError::BadId)?;
        Ok(Self { at, id })
    }

    /// Build a cursor from the two-field wire form.
    ///
    /// Both absent is "no cursor". Exactly one present is an error.
    pub fn from_parts(id: Option<&str>, at: Option<&str>) -> Result<Option<Self>, CursorError> {
        match (non_empty(id), non_empty(at)) {
            (None, None) => Ok(None),
            (Some(id), Some(at)) => {
                let id = Uuid::parse_str(id).map_err(|_| CursorError::BadId)?;
                let at = DateTime::parse_from_rfc3339(at)
                    .map_err(|_| CursorError::BadTimestamp)?
                    .with_timezone(&Utc);
                Ok(Some(Self::new(at, id)))
            }
            _ => Err(CursorError::Partial),
        }
    }

    /// Accept either the opaque token or the two-field form, never both.
    pub fn from_query(
        token: Option<&str>,
        id: Option<&str>,
        at: Option<&str>,
    ) -> Result<Option<Self>, CursorError> {
        match non_empty(token) {
            Some(token) => {
                if non_empty(id).is_some() || non_empty(at).is_some() {
                    return Err(CursorError::Ambiguous);
                }
                Self::decode(token).map(Some)
            }
            None => Self::from_parts(id, at),
        }
    }

    /// RFC 3339 with millisecond precision, the `cursorCreatedAt` wire form.
    pub fn at_rfc3339(&self) -> String {
        self.at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One page of results plus the continuation cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// Trim a `limit + 1` over-fetch into a page.
    ///
    /// `next_cursor` is taken from the last kept item and only when
    /// something was trimmed.
    pub fn from_overfetch(mut rows: Vec<T>, limit: usize, key: impl Fn(&T) -> Cursor) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more { rows.last().map(key) } else { None };
        Self {
            items: rows,
            has_more,
            next_cursor,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next_cursor: self.next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Cursor {
        Cursor::new(
            Utc.with_ymd_and_hms(2025, 3, 9, 12, 30, 5).unwrap() + chrono::Duration::milliseconds(417),
            Uuid::now_v7(),
        )
    }

    #[test]
    fn token_and_parts_decode_to_the_same_cursor() {
        let c = sample();
        assert_eq!(Cursor::decode(&c.encode()).unwrap(), c);

        let id = c.id.to_string();
        let at = c.at_rfc3339();
        assert_eq!(Cursor::from_parts(Some(&id), Some(&at)).unwrap(), Some(c));
    }

    #[test]
    fn token_is_query_safe() {
        let token = sample().encode();
        assert!(token.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
    }

    #[test]
    fn partial_cursor_rejected() {
        let id = Uuid::now_v7().to_string();
        assert_eq!(Cursor::from_parts(Some(&id), None), Err(CursorError::Partial));
        assert_eq!(
            Cursor::from_parts(None, Some("2025-01-01T00:00:00Z")),
            Err(CursorError::Partial)
        );
        assert_eq!(Cursor::from_parts(None, None), Ok(None));
        assert_eq!(Cursor::from_parts(Some(""), Some("  ")), Ok(None));
    }

    #[test]
    fn malformed_parts_rejected() {
        let id = Uuid::now_v7().to_string();
        assert_eq!(
            Cursor::from_parts(Some("not-an-id"), Some("2025-01-01T00:00:00Z")),
            Err(CursorError::BadId)
        );
        assert_eq!(
            Cursor::from_parts(Some(&id), Some("yesterday")),
            Err(CursorError::BadTimestamp)
        );
        assert_eq!(Cursor::decode("%%%"), Err(CursorError::BadToken));
        assert_eq!(Cursor::decode(&B64.encode("12.nope")), Err(CursorError::BadId));
    }

    #[test]
    fn token_timestamp_out_of_range_rejected() {
        let id = Uuid::now_v7();
        let huge = B64.encode(format!("{}.{}", i64::MAX, id));
        assert_eq!(Cursor::decode(&huge), Err(CursorError::BadTimestamp));
        let soon = B64.encode(format!("{}.{}", "soon", id));
        assert_eq!(Cursor::decode(&soon), Err(CursorError::BadTimestamp));
    }

    #[test]
    fn token_and_parts_together_is_ambiguous() {
        let c = sample();
        let id = c.id.to_string();
        assert_eq!(
            Cursor::from_query(Some(&c.encode()), Some(&id), None),
            Err(CursorError::Ambiguous)
        );
        assert_eq!(Cursor::from_query(Some(&c.encode()), None, None), Ok(Some(c)));
    }

    #[test]
    fn overfetch_trims_and_emits_cursor() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let rows: Vec<(i64, Uuid)> = (0..4).map(|i| (10 - i, Uuid::now_v7())).collect();
        let key = |r: &(i64, Uuid)| Cursor::new(base + chrono::Duration::seconds(r.0), r.1);

        let page = Page::from_overfetch(rows.clone(), 3, key);
        assert!(page.has_more);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.next_cursor, Some(key(&rows[2])));

        let page = Page::from_overfetch(rows, 4, key);
        assert!(!page.has_more);
        assert_eq!(page.next_cursor, None);
    }
}
