//! Profile service
//!
//! The identity provider for the feed: the local user's stable author id,
//! display name, biography and profile image. Views subscribe to profile
//! changes instead of listening for ad-hoc events, and renames cascade
//! into the feed through [`FeedStore::rename_author`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::ProfileConfig;
use crate::data::{
    AuthorId, EntityId, Identity, LocalStorage, PROFILE_IMAGE_KEY, USER_BIO_KEY, USER_ID_KEY,
    USER_NAME_KEY,
};
use crate::error::AppError;
use crate::service::FeedStore;

/// The local user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub author_id: AuthorId,
    pub display_name: String,
    pub bio: String,
    pub profile_image: String,
}

/// Fields to change; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    /// Ignored when empty
    pub profile_image: Option<String>,
}

/// Profile store
pub struct ProfileStore {
    storage: Arc<dyn LocalStorage>,
    profile: Profile,
    updates: watch::Sender<Profile>,
}

impl ProfileStore {
    /// Load the profile, falling back to configured defaults
    ///
    /// A stable author id is generated and saved on first use.
    ///
    /// # Errors
    /// Returns error if the generated author id cannot be saved
    pub fn load(storage: Arc<dyn LocalStorage>, defaults: &ProfileConfig) -> Result<Self, AppError> {
        let author_id = match read(storage.as_ref(), USER_ID_KEY) {
            Some(id) if !AuthorId::new(id.as_str()).is_anonymous() => AuthorId::new(id),
            stored => {
                if stored.is_some() {
                    tracing::warn!("Stored user id collides with the anonymous sentinel; regenerating");
                }
                let id = AuthorId::new(format!("user-{}", EntityId::new()));
                storage.set_item(USER_ID_KEY, id.as_str())?;
                tracing::info!(author_id = %id, "Generated local author id");
                id
            }
        };

        let profile = Profile {
            author_id,
            display_name: read(storage.as_ref(), USER_NAME_KEY)
                .unwrap_or_else(|| defaults.display_name.clone()),
            bio: read(storage.as_ref(), USER_BIO_KEY).unwrap_or_default(),
            profile_image: read(storage.as_ref(), PROFILE_IMAGE_KEY)
                .unwrap_or_else(|| defaults.profile_image.clone()),
        };

        let (updates, _) = watch::channel(profile.clone());
        Ok(Self {
            storage,
            profile,
            updates,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Identity to pass to feed mutations
    pub fn identity(&self) -> Identity {
        Identity::new(
            self.profile.author_id.clone(),
            self.profile.display_name.clone(),
        )
    }

    /// Observe profile changes
    pub fn subscribe(&self) -> watch::Receiver<Profile> {
        self.updates.subscribe()
    }

    /// Apply a profile edit
    ///
    /// Only changed keys are written. A new display name is cascaded onto
    /// every post, comment and reply authored by this user.
    ///
    /// # Errors
    /// - `Validation` if the display name is blank
    /// - Storage errors from writing the profile or the renamed feed. Keys
    ///   stored before a failed write stay applied and are published.
    pub fn update(
        &mut self,
        feed: &mut FeedStore,
        update: ProfileUpdate,
    ) -> Result<Profile, AppError> {
        let mut next = self.profile.clone();

        if let Some(name) = update.display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation(
                    "display name cannot be empty".to_string(),
                ));
            }
            next.display_name = name.to_string();
        }
        if let Some(bio) = update.bio {
            next.bio = bio.trim().to_string();
        }
        if let Some(image) = update.profile_image.filter(|image| !image.trim().is_empty()) {
            next.profile_image = image;
        }

        if next == self.profile {
            return Ok(next);
        }

        let renamed = next.display_name != self.profile.display_name;
        let mut committed = self.profile.clone();
        let written = self.write_changes(&next, &mut committed);
        if committed != self.profile {
            self.profile = committed.clone();
            self.updates.send_replace(committed);
        }
        written?;
        tracing::info!(author_id = %next.author_id, renamed, "Profile updated");

        if renamed {
            feed.rename_author(&next.author_id, &next.display_name)?;
        }

        Ok(next)
    }

    /// Write the keys that differ, recording each one in `committed` once
    /// it is stored. The name goes last so a stored name always has its
    /// cascade run.
    fn write_changes(&self, next: &Profile, committed: &mut Profile) -> Result<(), AppError> {
        if next.bio != committed.bio {
            self.storage.set_item(USER_BIO_KEY, &next.bio)?;
            committed.bio = next.bio.clone();
        }
        if next.profile_image != committed.profile_image {
            self.storage
                .set_item(PROFILE_IMAGE_KEY, &next.profile_image)?;
            committed.profile_image = next.profile_image.clone();
        }
        if next.display_name != committed.display_name {
            self.storage.set_item(USER_NAME_KEY, &next.display_name)?;
            committed.display_name = next.display_name.clone();
        }
        Ok(())
    }
}

/// Read failures degrade to the default value
fn read(storage: &dyn LocalStorage, key: &str) -> Option<String> {
    match storage.get_item(key) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, key, "Failed to read profile value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryStorage, MockLocalStorage};

    fn defaults() -> ProfileConfig {
        ProfileConfig {
            display_name: "Ali Rıza".to_string(),
            profile_image: "/profileIcon.png".to_string(),
        }
    }

    fn create_test_stores() -> (ProfileStore, FeedStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new(None));
        let profile = ProfileStore::load(storage.clone(), &defaults()).unwrap();
        let feed = FeedStore::initialize(storage.clone());
        (profile, feed, storage)
    }

    #[test]
    fn load_uses_defaults_and_persists_author_id() {
        let (profile, _feed, storage) = create_test_stores();

        assert_eq!(profile.profile().display_name, "Ali Rıza");
        assert_eq!(profile.profile().profile_image, "/profileIcon.png");
        assert_eq!(profile.profile().bio, "");

        let stored = storage.get_item(USER_ID_KEY).unwrap().unwrap();
        assert_eq!(stored, profile.profile().author_id.as_str());

        let reloaded = ProfileStore::load(storage, &defaults()).unwrap();
        assert_eq!(reloaded.profile().author_id, profile.profile().author_id);
    }

    #[test]
    fn anonymous_user_id_is_regenerated() {
        let storage = Arc::new(MemoryStorage::new(None));
        storage.set_item(USER_ID_KEY, "anonymous").unwrap();

        let profile = ProfileStore::load(storage, &defaults()).unwrap();
        assert!(!profile.profile().author_id.is_anonymous());
    }

    #[test]
    fn rename_cascades_into_feed_and_notifies() {
        let (mut profile, mut feed, storage) = create_test_stores();
        let identity = profile.identity();
        feed.add_post(&identity, false, "hello", None).unwrap();
        feed.add_post(&identity, true, "anon", None).unwrap();
        let mut receiver = profile.subscribe();

        let updated = profile
            .update(
                &mut feed,
                ProfileUpdate {
                    display_name: Some("  Ali Veli ".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.display_name, "Ali Veli");
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().display_name, "Ali Veli");
        assert_eq!(
            storage.get_item(USER_NAME_KEY).unwrap().as_deref(),
            Some("Ali Veli")
        );

        let snapshot = feed.snapshot();
        assert_eq!(snapshot[0].display_name, crate::data::ANONYMOUS_DISPLAY_NAME);
        assert_eq!(snapshot[1].display_name, "Ali Veli");
    }

    #[test]
    fn blank_name_is_rejected() {
        let (mut profile, mut feed, _storage) = create_test_stores();

        let error = profile
            .update(
                &mut feed,
                ProfileUpdate {
                    display_name: Some("   ".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
        assert_eq!(profile.profile().display_name, "Ali Rıza");
    }

    #[test]
    fn empty_image_keeps_previous_and_unchanged_update_is_silent() {
        let (mut profile, mut feed, storage) = create_test_stores();
        let mut receiver = profile.subscribe();

        profile
            .update(
                &mut feed,
                ProfileUpdate {
                    profile_image: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!receiver.has_changed().unwrap());
        assert!(storage.get_item(PROFILE_IMAGE_KEY).unwrap().is_none());

        profile
            .update(
                &mut feed,
                ProfileUpdate {
                    bio: Some("Rustacean".to_string()),
                    profile_image: Some("data:image/png;base64,AAAA".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(receiver.has_changed().unwrap());
        assert_eq!(
            storage.get_item(USER_BIO_KEY).unwrap().as_deref(),
            Some("Rustacean")
        );
    }

    #[test]
    fn failed_bio_write_leaves_name_and_feed_untouched() {
        let backing = Arc::new(MemoryStorage::new(None));
        let mut storage = MockLocalStorage::new();
        let reader = backing.clone();
        storage
            .expect_get_item()
            .returning(move |key| reader.get_item(key));
        let writer = backing.clone();
        storage.expect_set_item().returning(move |key, value| {
            if key == USER_BIO_KEY {
                Err(AppError::Storage("bio unavailable".to_string()))
            } else {
                writer.set_item(key, value)
            }
        });
        let storage: Arc<dyn LocalStorage> = Arc::new(storage);

        let mut profile = ProfileStore::load(storage.clone(), &defaults()).unwrap();
        let mut feed = FeedStore::initialize(storage.clone());
        feed.add_post(&profile.identity(), false, "hello", None).unwrap();

        let error = profile
            .update(
                &mut feed,
                ProfileUpdate {
                    display_name: Some("Veli".to_string()),
                    bio: Some("bio".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(error, AppError::Storage(_)));

        assert_eq!(profile.profile().display_name, "Ali Rıza");
        assert!(backing.get_item(USER_NAME_KEY).unwrap().is_none());
        assert_eq!(feed.snapshot()[0].display_name, "Ali Rıza");

        let reloaded = ProfileStore::load(storage, &defaults()).unwrap();
        assert_eq!(reloaded.profile().display_name, "Ali Rıza");
    }

    #[test]
    fn failed_name_write_keeps_committed_fields() {
        let backing = Arc::new(MemoryStorage::new(None));
        let mut storage = MockLocalStorage::new();
        let reader = backing.clone();
        storage
            .expect_get_item()
            .returning(move |key| reader.get_item(key));
        let writer = backing.clone();
        storage.expect_set_item().returning(move |key, value| {
            if key == USER_NAME_KEY {
                Err(AppError::Storage("name unavailable".to_string()))
            } else {
                writer.set_item(key, value)
            }
        });
        let storage: Arc<dyn LocalStorage> = Arc::new(storage);

        let mut profile = ProfileStore::load(storage.clone(), &defaults()).unwrap();
        let mut feed = FeedStore::initialize(storage);
        let mut receiver = profile.subscribe();

        assert!(
            profile
                .update(
                    &mut feed,
                    ProfileUpdate {
                        display_name: Some("Veli".to_string()),
                        bio: Some("bio".to_string()),
                        ..Default::default()
                    },
                )
                .is_err()
        );

        assert!(receiver.has_changed().unwrap());
        assert_eq!(profile.profile().bio, "bio");
        assert_eq!(profile.profile().display_name, "Ali Rıza");
        assert_eq!(backing.get_item(USER_BIO_KEY).unwrap().as_deref(), Some("bio"));
    }
}
