//! Snapshot schema migration
//!
//! Older clients persisted posts with different shapes: `userId`/`name`
//! instead of `authorId`/`displayName`, separate `audioUrl`/`imageUrl`
//! fields, comments stored as plain strings, comments without a `replies`
//! list, and optional like fields. Snapshots below
//! [`CURRENT_SCHEMA_VERSION`] are upgraded element by element into the
//! current structured form before they are handed to the store.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::models::{
    ANONYMOUS_DISPLAY_NAME, AuthorId, Comment, EntityId, MediaRef, Post, Reply,
};

/// Schema version written alongside every snapshot
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Result of upgrading a legacy snapshot
#[derive(Debug)]
pub struct MigratedSnapshot {
    pub posts: Vec<Post>,
    /// Elements that were not objects and had to be discarded
    pub dropped: usize,
}

/// Parse the stored schema version; a missing or unreadable value means
/// the snapshot predates versioning.
pub fn parse_schema_version(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0)
}

/// Upgrade a legacy snapshot
///
/// Returns `None` when the snapshot is not a JSON array.
///
/// # Arguments
/// * `raw` - The parsed snapshot value
/// * `loaded_at` - Timestamp substituted for missing or unreadable dates
pub fn upgrade_snapshot(raw: Value, loaded_at: DateTime<Utc>) -> Option<MigratedSnapshot> {
    let Value::Array(elements) = raw else {
        return None;
    };

    let mut posts = Vec::with_capacity(elements.len());
    let mut dropped = 0;
    for element in elements {
        match element {
            Value::Object(fields) => posts.push(upgrade_post(&fields, loaded_at)),
            other => {
                tracing::warn!(value = %other, "Dropping malformed post from legacy snapshot");
                dropped += 1;
            }
        }
    }

    reassign_duplicate_ids(&mut posts);
    Some(MigratedSnapshot { posts, dropped })
}

/// Legacy clients could persist the same id twice; every collection gets
/// unique ids before the store addresses entities by id.
fn reassign_duplicate_ids(posts: &mut [Post]) {
    unique_ids(posts.iter_mut().map(|post| &mut post.id), "post");
    for post in posts.iter_mut() {
        unique_ids(post.comments.iter_mut().map(|comment| &mut comment.id), "comment");
        for comment in post.comments.iter_mut() {
            unique_ids(comment.replies.iter_mut().map(|reply| &mut reply.id), "reply");
        }
    }
}

fn unique_ids<'a>(ids: impl Iterator<Item = &'a mut EntityId>, entity: &'static str) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.clone()) {
            let fresh = EntityId::new();
            tracing::warn!(
                %id,
                new_id = fresh.as_str(),
                entity,
                "Reassigning duplicate legacy id"
            );
            *id = fresh;
            seen.insert(id.clone());
        }
    }
}

fn upgrade_post(fields: &Map<String, Value>, loaded_at: DateTime<Utc>) -> Post {
    let created_at = timestamp(fields, loaded_at);
    let (author_id, display_name) = authorship(fields);

    let comments = match fields.get("comments") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| upgrade_comment(item, created_at))
            .collect(),
        _ => Vec::new(),
    };

    let (like_count, is_liked) = likes(fields);
    let mut post = Post {
        id: entity_id(fields),
        author_id,
        display_name,
        text: string_field(fields, &["text"]).unwrap_or_default(),
        media_ref: media_ref(fields),
        created_at,
        like_count,
        is_liked,
        comment_count: 0,
        comments,
    };
    post.recount_comments();
    post
}

fn upgrade_comment(value: &Value, parent_created_at: DateTime<Utc>) -> Option<Comment> {
    match value {
        Value::String(text) => Some(Comment {
            id: EntityId::new(),
            author_id: AuthorId::anonymous(),
            display_name: ANONYMOUS_DISPLAY_NAME.to_string(),
            text: text.clone(),
            created_at: parent_created_at,
            like_count: 0,
            is_liked: false,
            replies: Vec::new(),
        }),
        Value::Object(fields) => {
            let created_at = timestamp(fields, parent_created_at);
            let replies = match fields.get("replies") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| upgrade_reply(item, created_at))
                    .collect(),
                _ => Vec::new(),
            };
            let (author_id, display_name) = authorship(fields);
            let (like_count, is_liked) = likes(fields);
            Some(Comment {
                id: entity_id(fields),
                author_id,
                display_name,
                text: string_field(fields, &["text"]).unwrap_or_default(),
                created_at,
                like_count,
                is_liked,
                replies,
            })
        }
        other => {
            tracing::warn!(value = %other, "Dropping malformed comment from legacy snapshot");
            None
        }
    }
}

fn upgrade_reply(value: &Value, parent_created_at: DateTime<Utc>) -> Option<Reply> {
    match value {
        Value::String(text) => Some(Reply {
            id: EntityId::new(),
            author_id: AuthorId::anonymous(),
            display_name: ANONYMOUS_DISPLAY_NAME.to_string(),
            text: text.clone(),
            created_at: parent_created_at,
            like_count: 0,
            is_liked: false,
        }),
        Value::Object(fields) => {
            let (author_id, display_name) = authorship(fields);
            let (like_count, is_liked) = likes(fields);
            Some(Reply {
                id: entity_id(fields),
                author_id,
                display_name,
                text: string_field(fields, &["text"]).unwrap_or_default(),
                created_at: timestamp(fields, parent_created_at),
                like_count,
                is_liked,
            })
        }
        other => {
            tracing::warn!(value = %other, "Dropping malformed reply from legacy snapshot");
            None
        }
    }
}

/// First present field among `names`, with numbers accepted as strings
fn string_field(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match fields.get(*name) {
        Some(Value::String(value)) => Some(value.clone()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}

fn entity_id(fields: &Map<String, Value>) -> EntityId {
    string_field(fields, &["id"])
        .filter(|id| !id.is_empty())
        .map(EntityId::from_string)
        .unwrap_or_default()
}

/// Content without a recorded author id cannot be attributed to anyone,
/// so it is treated as anonymous.
fn authorship(fields: &Map<String, Value>) -> (AuthorId, String) {
    let display_name = string_field(fields, &["displayName", "name"]);
    let author_id = string_field(fields, &["authorId", "userId"]).filter(|id| !id.is_empty());

    match (author_id, display_name) {
        (Some(id), Some(name)) => (AuthorId::new(id), name),
        (Some(id), None) => (AuthorId::new(id), ANONYMOUS_DISPLAY_NAME.to_string()),
        (None, _) => (AuthorId::anonymous(), ANONYMOUS_DISPLAY_NAME.to_string()),
    }
}

fn likes(fields: &Map<String, Value>) -> (u32, bool) {
    let like_count = fields
        .get("likeCount")
        .and_then(Value::as_i64)
        .map(|count| u32::try_from(count.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0);
    let is_liked = fields
        .get("isLiked")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    (like_count, is_liked)
}

fn timestamp(fields: &Map<String, Value>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    fields
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(fallback)
}

/// Audio wins when a legacy post carries both attachments
fn media_ref(fields: &Map<String, Value>) -> Option<MediaRef> {
    if let Some(value) = fields.get("mediaRef") {
        if let Ok(media) = serde_json::from_value::<MediaRef>(value.clone()) {
            return Some(media);
        }
    }

    let non_empty = |name: &str| string_field(fields, &[name]).filter(|url| !url.is_empty());
    non_empty("audioUrl")
        .map(MediaRef::Audio)
        .or_else(|| non_empty("imageUrl").map(MediaRef::Image))
}
