//! Feed service
//!
//! Owns the ordered post collection and every nested mutation on it:
//! posts, comments, replies, likes and author renames. Each mutation
//! builds a new snapshot, writes it to local storage and only then makes
//! it current, so callers never observe state that was not saved.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::watch;

use crate::data::{
    self, AuthorId, CURRENT_SCHEMA_VERSION, Comment, Identity, Likeable, LocalStorage, MediaRef,
    POSTS_KEY, POSTS_SCHEMA_VERSION_KEY, Post, Reply,
};
use crate::error::AppError;
use crate::metrics::{
    ERRORS_TOTAL, FEED_OPERATIONS_TOTAL, FEED_POSTS, MIGRATED_POSTS_TOTAL, SNAPSHOT_BYTES,
    SNAPSHOT_WRITES_TOTAL,
};

/// Immutable view of the feed handed to renderers
pub type Snapshot = Arc<Vec<Post>>;

/// Entity a mutation could not find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Post,
    Comment,
    Reply,
}

/// Why a mutation was refused before touching the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No text and no media attachment
    EmptyContent,
    /// Anonymous content cannot be renamed
    AnonymousAuthor,
    EmptyDisplayName,
}

/// Caller-visible result of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The snapshot changed and was persisted
    Applied,
    /// The target no longer exists; nothing changed
    NotFound(Target),
    /// Input failed validation; nothing changed
    Rejected(Rejection),
    /// Valid request that matched nothing to change
    Unchanged,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    fn label(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::NotFound(_) => "not_found",
            Outcome::Rejected(_) => "rejected",
            Outcome::Unchanged => "unchanged",
        }
    }
}

/// Snapshot after a mutation together with what happened
#[derive(Debug, Clone)]
pub struct Mutation {
    pub snapshot: Snapshot,
    pub outcome: Outcome,
}

/// Feed store
pub struct FeedStore {
    storage: Arc<dyn LocalStorage>,
    posts: Snapshot,
    updates: watch::Sender<Snapshot>,
    /// Set while the schema version key lags behind the snapshot
    schema_pending: AtomicBool,
}

impl FeedStore {
    /// Load the persisted feed
    ///
    /// Missing, unreadable or corrupt snapshots start an empty feed with a
    /// warning. Legacy snapshots are upgraded and written back once; if
    /// that write fails the upgraded feed is kept in memory and saved by
    /// the next mutation.
    pub fn initialize(storage: Arc<dyn LocalStorage>) -> Self {
        let (posts, schema_pending) = Self::load(storage.as_ref());
        FEED_POSTS.set(posts.len() as i64);

        tracing::info!(posts = posts.len(), schema_pending, "Feed store initialized");

        let posts: Snapshot = Arc::new(posts);
        let (updates, _) = watch::channel(posts.clone());
        Self {
            storage,
            posts,
            updates,
            schema_pending: AtomicBool::new(schema_pending),
        }
    }

    /// Returns the posts and whether the schema version still has to be
    /// written.
    fn load(storage: &dyn LocalStorage) -> (Vec<Post>, bool) {
        let version = match storage.get_item(POSTS_SCHEMA_VERSION_KEY) {
            Ok(raw) => data::migrate::parse_schema_version(raw.as_deref()),
            Err(error) => {
                tracing::warn!(%error, "Failed to read snapshot schema version");
                0
            }
        };

        let raw = match storage.get_item(POSTS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                if version == CURRENT_SCHEMA_VERSION {
                    return (Vec::new(), false);
                }
                let pending = match write_schema_version(storage) {
                    Ok(()) => false,
                    Err(error) => {
                        tracing::warn!(%error, "Failed to write snapshot schema version");
                        true
                    }
                };
                return (Vec::new(), pending);
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to read feed snapshot; starting empty");
                return (Vec::new(), false);
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "Feed snapshot is not valid JSON; starting empty");
                return (Vec::new(), false);
            }
        };

        if version >= CURRENT_SCHEMA_VERSION {
            let posts = match serde_json::from_value::<Vec<Post>>(value) {
                Ok(mut posts) => {
                    for post in posts.iter_mut() {
                        let expected = post.structural_comment_count();
                        if post.comment_count != expected {
                            tracing::warn!(
                                post_id = %post.id,
                                stored = post.comment_count,
                                expected,
                                "Repairing comment count"
                            );
                            post.comment_count = expected;
                        }
                    }
                    posts
                }
                Err(error) => {
                    tracing::warn!(%error, "Feed snapshot does not match schema; starting empty");
                    Vec::new()
                }
            };
            return (posts, false);
        }

        let Some(migrated) = data::migrate::upgrade_snapshot(value, Utc::now()) else {
            tracing::warn!("Legacy feed snapshot is not an array; starting empty");
            return (Vec::new(), false);
        };

        tracing::info!(
            from_version = version,
            to_version = CURRENT_SCHEMA_VERSION,
            posts = migrated.posts.len(),
            dropped = migrated.dropped,
            "Migrated legacy feed snapshot"
        );
        MIGRATED_POSTS_TOTAL.inc_by(migrated.posts.len() as u64);

        let written = serde_json::to_string(&migrated.posts)
            .map_err(AppError::from)
            .and_then(|encoded| storage.set_item(POSTS_KEY, &encoded))
            .and_then(|()| write_schema_version(storage));
        let pending = match written {
            Ok(()) => false,
            Err(error) => {
                tracing::warn!(
                    %error,
                    "Failed to write back migrated snapshot; keeping it in memory"
                );
                true
            }
        };

        (migrated.posts, pending)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.posts.clone()
    }

    /// Observe every committed snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.updates.subscribe()
    }

    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id.as_str() == post_id)
    }

    /// Posts owned by `author_id`, newest first
    ///
    /// Anonymous posts are never attributed to anyone.
    pub fn posts_by_author(&self, author_id: &AuthorId) -> Vec<&Post> {
        self.posts
            .iter()
            .filter(|p| p.is_authored_by(author_id))
            .collect()
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Publish a new post at the top of the feed
    ///
    /// # Arguments
    /// * `identity` - Current user
    /// * `anonymous` - Record the anonymous sentinel instead of `identity`
    /// * `text` - Post body, may be empty when media is attached
    /// * `media` - Optional audio or image attachment
    pub fn add_post(
        &mut self,
        identity: &Identity,
        anonymous: bool,
        text: &str,
        media: Option<MediaRef>,
    ) -> Result<Mutation, AppError> {
        const OP: &str = "add_post";

        let text = text.trim().to_string();
        let media = media.filter(|m| !m.url().trim().is_empty());
        if text.is_empty() && media.is_none() {
            return Ok(self.skip(OP, Outcome::Rejected(Rejection::EmptyContent)));
        }

        let author = if anonymous || identity.author_id.is_anonymous() {
            Identity::anonymous()
        } else {
            identity.clone()
        };
        let post = Post::new(&author, text, media);

        tracing::debug!(post_id = %post.id, anonymous, "Adding post");
        self.apply(OP, |posts| {
            posts.insert(0, post);
            Outcome::Applied
        })
    }

    /// Remove a post together with its comments and replies
    pub fn delete_post(&mut self, post_id: &str) -> Result<Mutation, AppError> {
        if self.post(post_id).is_none() {
            return Ok(self.skip("delete_post", Outcome::NotFound(Target::Post)));
        }

        self.apply("delete_post", |posts| {
            posts.retain(|p| p.id.as_str() != post_id);
            Outcome::Applied
        })
    }

    pub fn toggle_like(&mut self, post_id: &str) -> Result<Mutation, AppError> {
        self.apply("toggle_like", |posts| match find_post(posts, post_id) {
            Some(post) => {
                post.toggle_like();
                Outcome::Applied
            }
            None => Outcome::NotFound(Target::Post),
        })
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Append a comment to a post
    pub fn add_comment(
        &mut self,
        post_id: &str,
        identity: &Identity,
        text: &str,
    ) -> Result<Mutation, AppError> {
        const OP: &str = "add_comment";

        let text = text.trim();
        if text.is_empty() {
            return Ok(self.skip(OP, Outcome::Rejected(Rejection::EmptyContent)));
        }

        self.apply(OP, |posts| {
            let Some(post) = find_post(posts, post_id) else {
                return Outcome::NotFound(Target::Post);
            };
            post.comments.push(Comment::new(identity, text.to_string()));
            post.comment_count += 1;
            Outcome::Applied
        })
    }

    /// Remove a comment and its replies
    ///
    /// The post's comment count drops by one plus the number of replies.
    pub fn delete_comment(&mut self, post_id: &str, comment_id: &str) -> Result<Mutation, AppError> {
        self.apply("delete_comment", |posts| {
            let Some(post) = find_post(posts, post_id) else {
                return Outcome::NotFound(Target::Post);
            };
            let Some(index) = post.comments.iter().position(|c| c.id.as_str() == comment_id)
            else {
                return Outcome::NotFound(Target::Comment);
            };

            let removed = post.comments.remove(index);
            let delta = u32::try_from(1 + removed.replies.len()).unwrap_or(u32::MAX);
            post.comment_count = post.comment_count.saturating_sub(delta);
            Outcome::Applied
        })
    }

    pub fn toggle_comment_like(
        &mut self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<Mutation, AppError> {
        self.apply("toggle_comment_like", |posts| {
            let Some(post) = find_post(posts, post_id) else {
                return Outcome::NotFound(Target::Post);
            };
            match post.find_comment_mut(comment_id) {
                Some(comment) => {
                    comment.toggle_like();
                    Outcome::Applied
                }
                None => Outcome::NotFound(Target::Comment),
            }
        })
    }

    // =========================================================================
    // Replies
    // =========================================================================

    /// Append a reply to a comment
    ///
    /// Replies count toward the parent post's comment count.
    pub fn add_reply(
        &mut self,
        post_id: &str,
        comment_id: &str,
        identity: &Identity,
        text: &str,
    ) -> Result<Mutation, AppError> {
        const OP: &str = "add_reply";

        let text = text.trim();
        if text.is_empty() {
            return Ok(self.skip(OP, Outcome::Rejected(Rejection::EmptyContent)));
        }

        self.apply(OP, |posts| {
            let Some(post) = find_post(posts, post_id) else {
                return Outcome::NotFound(Target::Post);
            };
            let Some(comment) = post.find_comment_mut(comment_id) else {
                return Outcome::NotFound(Target::Comment);
            };
            comment.replies.push(Reply::new(identity, text.to_string()));
            post.comment_count += 1;
            Outcome::Applied
        })
    }

    pub fn delete_reply(
        &mut self,
        post_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<Mutation, AppError> {
        self.apply("delete_reply", |posts| {
            let Some(post) = find_post(posts, post_id) else {
                return Outcome::NotFound(Target::Post);
            };
            let Some(comment) = post.find_comment_mut(comment_id) else {
                return Outcome::NotFound(Target::Comment);
            };
            let Some(index) = comment.replies.iter().position(|r| r.id.as_str() == reply_id)
            else {
                return Outcome::NotFound(Target::Reply);
            };

            comment.replies.remove(index);
            post.comment_count = post.comment_count.saturating_sub(1);
            Outcome::Applied
        })
    }

    pub fn toggle_reply_like(
        &mut self,
        post_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<Mutation, AppError> {
        self.apply("toggle_reply_like", |posts| {
            let Some(post) = find_post(posts, post_id) else {
                return Outcome::NotFound(Target::Post);
            };
            let Some(comment) = post.find_comment_mut(comment_id) else {
                return Outcome::NotFound(Target::Comment);
            };
            match comment.find_reply_mut(reply_id) {
                Some(reply) => {
                    reply.toggle_like();
                    Outcome::Applied
                }
                None => Outcome::NotFound(Target::Reply),
            }
        })
    }

    // =========================================================================
    // Authors
    // =========================================================================

    /// Rewrite the display name on everything `author_id` wrote
    ///
    /// Visits every post, comment and reply once. Anonymous content is
    /// never touched.
    pub fn rename_author(
        &mut self,
        author_id: &AuthorId,
        new_display_name: &str,
    ) -> Result<Mutation, AppError> {
        const OP: &str = "rename_author";

        if author_id.is_anonymous() {
            return Ok(self.skip(OP, Outcome::Rejected(Rejection::AnonymousAuthor)));
        }
        let new_name = new_display_name.trim();
        if new_name.is_empty() {
            return Ok(self.skip(OP, Outcome::Rejected(Rejection::EmptyDisplayName)));
        }

        self.apply(OP, |posts| {
            let mut renamed = 0usize;
            let mut rename = |owner: &AuthorId, display_name: &mut String| {
                if owner == author_id && display_name.as_str() != new_name {
                    *display_name = new_name.to_string();
                    renamed += 1;
                }
            };

            for post in posts.iter_mut() {
                rename(&post.author_id, &mut post.display_name);
                for comment in post.comments.iter_mut() {
                    rename(&comment.author_id, &mut comment.display_name);
                    for reply in comment.replies.iter_mut() {
                        rename(&reply.author_id, &mut reply.display_name);
                    }
                }
            }

            tracing::debug!(author_id = %author_id, renamed, "Renamed author");
            if renamed == 0 {
                Outcome::Unchanged
            } else {
                Outcome::Applied
            }
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Rewrite the current snapshot to storage
    pub fn flush(&self) -> Result<(), AppError> {
        self.write_snapshot("flush", &self.posts)
    }

    /// Flush and end the store's lifecycle
    pub fn teardown(self) -> Result<(), AppError> {
        self.flush()?;
        tracing::info!(posts = self.posts.len(), "Feed store closed");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Run `edit` on a copy of the feed and commit it if it applied
    fn apply<F>(&mut self, operation: &'static str, edit: F) -> Result<Mutation, AppError>
    where
        F: FnOnce(&mut Vec<Post>) -> Outcome,
    {
        let mut next = self.posts.as_ref().clone();
        let outcome = edit(&mut next);
        if !outcome.is_applied() {
            return Ok(self.skip(operation, outcome));
        }

        debug_assert!(
            next.iter()
                .all(|p| p.comment_count == p.structural_comment_count()),
            "comment count out of sync after {operation}"
        );

        self.write_snapshot(operation, &next)?;
        FEED_OPERATIONS_TOTAL
            .with_label_values(&[operation, outcome.label()])
            .inc();
        FEED_POSTS.set(next.len() as i64);

        let snapshot: Snapshot = Arc::new(next);
        self.posts = snapshot.clone();
        self.updates.send_replace(snapshot.clone());

        Ok(Mutation { snapshot, outcome })
    }

    fn skip(&self, operation: &'static str, outcome: Outcome) -> Mutation {
        tracing::debug!(operation, ?outcome, "Feed left unchanged");
        FEED_OPERATIONS_TOTAL
            .with_label_values(&[operation, outcome.label()])
            .inc();
        Mutation {
            snapshot: self.posts.clone(),
            outcome,
        }
    }

    fn write_snapshot(&self, operation: &'static str, posts: &[Post]) -> Result<(), AppError> {
        let result = serde_json::to_string(posts)
            .map_err(AppError::from)
            .and_then(|encoded| {
                self.storage.set_item(POSTS_KEY, &encoded)?;
                if self.schema_pending.load(Ordering::Acquire) {
                    write_schema_version(self.storage.as_ref())?;
                    self.schema_pending.store(false, Ordering::Release);
                }
                Ok(encoded.len())
            });

        match result {
            Ok(bytes) => {
                SNAPSHOT_WRITES_TOTAL.with_label_values(&["success"]).inc();
                SNAPSHOT_BYTES.set(bytes as i64);
                Ok(())
            }
            Err(error) => {
                SNAPSHOT_WRITES_TOTAL.with_label_values(&["failure"]).inc();
                ERRORS_TOTAL
                    .with_label_values(&[error.kind(), operation])
                    .inc();
                tracing::error!(%error, operation, "Failed to persist feed snapshot");
                Err(error)
            }
        }
    }
}

fn write_schema_version(storage: &dyn LocalStorage) -> Result<(), AppError> {
    storage.set_item(POSTS_SCHEMA_VERSION_KEY, &CURRENT_SCHEMA_VERSION.to_string())
}

fn find_post<'a>(posts: &'a mut [Post], post_id: &str) -> Option<&'a mut Post> {
    posts.iter_mut().find(|p| p.id.as_str() == post_id)
}
