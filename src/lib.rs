//! Feedstore - a local-storage backed social feed store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 UI collaborators (external)                  │
//! │  - Post form, post cards, profile and settings views        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - FeedStore: posts, comments, replies, likes, renames      │
//! │  - ProfileStore: identity provider and profile settings     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Snapshot models                                          │
//! │  - Key/value local storage (file or memory)                 │
//! │  - Legacy snapshot migration                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `service`: Feed and profile stores
//! - `data`: Models, storage backends and migration
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

use data::{FileStorage, Identity, LocalStorage, MemoryStorage};
use service::{FeedStore, Profile, ProfileStore, ProfileUpdate};

/// Application state
///
/// Owns the storage backend and both stores. UI collaborators receive
/// the stores from here rather than reaching into storage themselves.
pub struct FeedApp {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Durable key/value storage shared by both stores
    pub storage: Arc<dyn LocalStorage>,

    /// Post collection
    pub feed: FeedStore,

    /// Local user's profile
    pub profile: ProfileStore,
}

impl FeedApp {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Open the configured storage backend
    /// 2. Load the local user's profile
    /// 3. Rehydrate the feed
    ///
    /// # Errors
    /// Returns error if storage cannot be opened or initial writes fail
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Open storage
        let storage: Arc<dyn LocalStorage> = match config.storage.backend {
            config::StorageBackend::File => Arc::new(FileStorage::open(
                &config.storage.path,
                config.storage.quota_bytes,
            )?),
            config::StorageBackend::Memory => {
                Arc::new(MemoryStorage::new(config.storage.quota_bytes))
            }
        };
        tracing::info!(backend = ?config.storage.backend, "Storage opened");
        if config.storage.backend == config::StorageBackend::Memory {
            tracing::warn!("Using in-memory storage; the feed will not survive a restart");
        }

        // 2. Load profile
        let profile = ProfileStore::load(storage.clone(), &config.profile)?;

        // 3. Rehydrate feed
        let feed = FeedStore::initialize(storage.clone());

        tracing::info!(
            author_id = %profile.profile().author_id,
            posts = feed.snapshot().len(),
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            feed,
            profile,
        })
    }

    /// Identity of the local user for feed mutations
    pub fn identity(&self) -> Identity {
        self.profile.identity()
    }

    /// Edit the local user's profile, cascading renames into the feed
    pub fn update_profile(&mut self, update: ProfileUpdate) -> Result<Profile, error::AppError> {
        self.profile.update(&mut self.feed, update)
    }

    /// Flush the feed and release the stores
    pub fn teardown(self) -> Result<(), error::AppError> {
        self.feed.teardown()
    }
}
