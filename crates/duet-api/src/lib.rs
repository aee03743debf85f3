pub mod auth;
pub mod avatars;
pub mod error;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod pagination;
pub mod router;
pub mod users;
