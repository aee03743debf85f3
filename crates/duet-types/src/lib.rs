pub mod api;
pub mod models;
pub mod pagination;
pub mod pair;

pub use pagination::{Cursor, CursorError, Page};
pub use pair::{PairKey, PairKeyError};
