//! Common test utilities for integration tests
#![allow(dead_code)]

pub mod schema_validator;

use std::sync::Arc;

use feedstore::data::{AuthorId, EntityId, FileStorage, Identity, LocalStorage, Post};
use feedstore::service::FeedStore;
use tempfile::TempDir;

/// File-backed feed store in a temporary directory
pub struct TestFeed {
    pub store: FeedStore,
    pub storage: Arc<FileStorage>,
    pub _temp_dir: TempDir,
}

impl TestFeed {
    /// Create a store over an empty storage directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        Self::open_in(temp_dir)
    }

    /// Create a store over a directory seeded with raw storage items
    pub fn with_items(items: &[(&str, &str)]) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::open(temp_dir.path(), None).unwrap();
        for (key, value) in items {
            storage.set_item(key, value).unwrap();
        }
        Self::open_in(temp_dir)
    }

    fn open_in(temp_dir: TempDir) -> Self {
        let storage = Arc::new(FileStorage::open(temp_dir.path(), None).unwrap());
        let store = FeedStore::initialize(storage.clone());
        Self {
            store,
            storage,
            _temp_dir: temp_dir,
        }
    }

    /// Drop the store and rehydrate it from the same directory
    pub fn reopen(self) -> Self {
        let Self {
            store, _temp_dir, ..
        } = self;
        store.teardown().unwrap();
        Self::open_in(_temp_dir)
    }

    /// Raw persisted snapshot
    pub fn persisted(&self) -> Option<String> {
        self.storage.get_item(feedstore::data::POSTS_KEY).unwrap()
    }
}

pub fn user(id: &str, name: &str) -> Identity {
    Identity::new(AuthorId::new(id), name)
}

pub fn assert_comment_counts(posts: &[Post]) {
    for post in posts {
        let expected: usize = post.comments.iter().map(|c| 1 + c.replies.len()).sum();
        assert_eq!(
            post.comment_count as usize, expected,
            "comment count out of sync on post {}",
            post.id
        );
    }
}

pub fn id_of(id: &EntityId) -> String {
    id.as_str().to_string()
}
