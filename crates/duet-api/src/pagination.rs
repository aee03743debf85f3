use duet_types::Cursor;
use duet_types::api::PageQuery;

use crate::error::{ApiError, ApiResult};

pub const MAX_PAGE_SIZE: usize = 100;

/// Validate the cursor and limit of a list request.
///
/// Runs before any storage access so a bad cursor never reaches a query.
pub fn page_params(query: &PageQuery, default_limit: usize) -> ApiResult<(Option<Cursor>, usize)> {
    let cursor = Cursor::from_query(
        query.cursor.as_deref(),
        query.cursor_id.as_deref(),
        query.cursor_created_at.as_deref(),
    )?;

    let limit = match query.limit {
        None => default_limit,
        Some(n) if (1..=MAX_PAGE_SIZE as u32).contains(&n) => n as usize,
        Some(_) => {
            return Err(ApiError::invalid(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
    };

    Ok((cursor, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_types::CursorError;

    #[test]
    fn defaults_and_bounds() {
        let q = PageQuery::default();
        assert_eq!(page_params(&q, 10).unwrap(), (None, 10));

        let q = PageQuery { limit: Some(0), ..Default::default() };
        assert!(matches!(page_params(&q, 10), Err(ApiError::InvalidArgument(_))));

        let q = PageQuery { limit: Some(101), ..Default::default() };
        assert!(page_params(&q, 10).is_err());
    }

    #[test]
    fn half_a_cursor_is_rejected() {
        let q = PageQuery {
            cursor_id: Some(uuid::Uuid::now_v7().to_string()),
            ..Default::default()
        };
        assert!(matches!(
            page_params(&q, 20),
            Err(ApiError::InvalidCursor(CursorError::Partial))
        ));
    }
}
