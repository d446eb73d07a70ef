//! Service layer
//!
//! Contains the stores UI collaborators call into. Services validate
//! input, mutate snapshots and persist them through the data layer.

mod feed;
mod profile;

pub use feed::{FeedStore, Mutation, Outcome, Rejection, Snapshot, Target};
pub use profile::{Profile, ProfileStore, ProfileUpdate};
