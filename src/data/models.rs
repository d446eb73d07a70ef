//! Data models
//!
//! Rust structs representing the persisted feed snapshot.
//! All models use ULID for IDs and chrono for timestamps, and
//! serialize with camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author id recorded on anonymous content
pub const ANONYMOUS_AUTHOR_ID: &str = "anonymous";

/// Display name recorded on anonymous content
pub const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identity of a content author
///
/// Ownership is always decided by comparing author ids, never display names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(pub String);

impl AuthorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The sentinel id used for anonymous content
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_AUTHOR_ID.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_AUTHOR_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is performing a mutation, as supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub author_id: AuthorId,
    pub display_name: String,
}

impl Identity {
    pub fn new(author_id: AuthorId, display_name: impl Into<String>) -> Self {
        Self {
            author_id,
            display_name: display_name.into(),
        }
    }

    /// The identity recorded on anonymous posts
    pub fn anonymous() -> Self {
        Self::new(AuthorId::anonymous(), ANONYMOUS_DISPLAY_NAME)
    }
}

// =============================================================================
// Media
// =============================================================================

/// Media attached to a post
///
/// A post carries at most one attachment. The URL is a session-local
/// reference and is not expected to survive a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "lowercase")]
pub enum MediaRef {
    Audio(String),
    Image(String),
}

impl MediaRef {
    pub fn url(&self) -> &str {
        match self {
            Self::Audio(url) | Self::Image(url) => url,
        }
    }
}

// =============================================================================
// Likes
// =============================================================================

/// Viewer-relative like state shared by posts, comments and replies
pub trait Likeable {
    fn like_state(&mut self) -> (&mut bool, &mut u32);

    /// Flip the like flag and move the counter with it.
    ///
    /// The counter only decrements when currently liked and saturates at zero.
    fn toggle_like(&mut self) {
        let (is_liked, like_count) = self.like_state();
        if *is_liked {
            *is_liked = false;
            *like_count = like_count.saturating_sub(1);
        } else {
            *is_liked = true;
            *like_count = like_count.saturating_add(1);
        }
    }
}

// =============================================================================
// Reply
// =============================================================================

/// Second-level response attached to a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: EntityId,
    pub author_id: AuthorId,
    pub display_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u32,
    pub is_liked: bool,
}

impl Reply {
    pub fn new(identity: &Identity, text: String) -> Self {
        Self {
            id: EntityId::new(),
            author_id: identity.author_id.clone(),
            display_name: identity.display_name.clone(),
            text,
            created_at: Utc::now(),
            like_count: 0,
            is_liked: false,
        }
    }
}

impl Likeable for Reply {
    fn like_state(&mut self) -> (&mut bool, &mut u32) {
        (&mut self.is_liked, &mut self.like_count)
    }
}

// =============================================================================
// Comment
// =============================================================================

/// First-level response to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: EntityId,
    pub author_id: AuthorId,
    pub display_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u32,
    pub is_liked: bool,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

impl Comment {
    pub fn new(identity: &Identity, text: String) -> Self {
        Self {
            id: EntityId::new(),
            author_id: identity.author_id.clone(),
            display_name: identity.display_name.clone(),
            text,
            created_at: Utc::now(),
            like_count: 0,
            is_liked: false,
            replies: Vec::new(),
        }
    }

    pub fn find_reply_mut(&mut self, reply_id: &str) -> Option<&mut Reply> {
        self.replies.iter_mut().find(|r| r.id.as_str() == reply_id)
    }
}

impl Likeable for Comment {
    fn like_state(&mut self) -> (&mut bool, &mut u32) {
        (&mut self.is_liked, &mut self.like_count)
    }
}

// =============================================================================
// Post
// =============================================================================

/// Top-level feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: EntityId,
    pub author_id: AuthorId,
    pub display_name: String,
    /// Empty when the post only carries media
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<MediaRef>,
    pub created_at: DateTime<Utc>,
    pub like_count: u32,
    pub is_liked: bool,
    /// Comments plus replies across all comments
    pub comment_count: u32,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    pub fn new(identity: &Identity, text: String, media_ref: Option<MediaRef>) -> Self {
        Self {
            id: EntityId::new(),
            author_id: identity.author_id.clone(),
            display_name: identity.display_name.clone(),
            text,
            media_ref,
            created_at: Utc::now(),
            like_count: 0,
            is_liked: false,
            comment_count: 0,
            comments: Vec::new(),
        }
    }

    /// Count comments and their replies from the nested structure
    pub fn structural_comment_count(&self) -> u32 {
        let total: usize = self
            .comments
            .iter()
            .map(|comment| 1 + comment.replies.len())
            .sum();
        u32::try_from(total).unwrap_or(u32::MAX)
    }

    /// Reset `comment_count` from the nested structure
    pub fn recount_comments(&mut self) {
        self.comment_count = self.structural_comment_count();
    }

    pub fn is_authored_by(&self, author_id: &AuthorId) -> bool {
        !author_id.is_anonymous() && &self.author_id == author_id
    }

    pub fn find_comment(&self, comment_id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id.as_str() == comment_id)
    }

    pub fn find_comment_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id.as_str() == comment_id)
    }
}

impl Likeable for Post {
    fn like_state(&mut self) -> (&mut bool, &mut u32) {
        (&mut self.is_liked, &mut self.like_count)
    }
}
