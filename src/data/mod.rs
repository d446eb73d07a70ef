//! Data layer module
//!
//! Handles the persisted feed model:
//! - Post/comment/reply models
//! - Local key/value storage backends
//! - Legacy snapshot migration

pub mod migrate;
mod models;
mod storage;
mod time;

pub use migrate::CURRENT_SCHEMA_VERSION;
pub use models::*;
pub use storage::{
    FileStorage, LocalStorage, MemoryStorage, POSTS_KEY, POSTS_SCHEMA_VERSION_KEY,
    PROFILE_IMAGE_KEY, USER_BIO_KEY, USER_ID_KEY, USER_NAME_KEY,
};
pub use time::format_time_ago;

#[cfg(test)]
pub use storage::MockLocalStorage;
