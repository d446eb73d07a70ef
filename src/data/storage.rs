//! Local key/value storage
//!
//! Browser `localStorage` semantics: raw string values under string keys,
//! written synchronously. Every durable read or write in the crate goes
//! through [`LocalStorage`].

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::AppError;

/// Serialized feed snapshot (JSON array of posts)
pub const POSTS_KEY: &str = "posts";
/// Schema version of the value under [`POSTS_KEY`]
pub const POSTS_SCHEMA_VERSION_KEY: &str = "postsSchemaVersion";
/// Stable author id of the local user
pub const USER_ID_KEY: &str = "userId";
/// Current user's display name
pub const USER_NAME_KEY: &str = "userName";
/// Current user's profile image reference
pub const PROFILE_IMAGE_KEY: &str = "profileImage";
/// Current user's biography
pub const USER_BIO_KEY: &str = "userBio";

const ITEM_EXTENSION: &str = "item";

/// Durable key/value storage backend
#[cfg_attr(test, mockall::automock)]
pub trait LocalStorage: Send + Sync {
    /// Read the raw value under `key`
    fn get_item(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Replace the value under `key`
    ///
    /// On failure the previous value is left untouched.
    fn set_item(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove_item(&self, key: &str) -> Result<(), AppError>;
}

fn check_quota(quota: Option<usize>, required: usize) -> Result<(), AppError> {
    match quota {
        Some(quota) if required > quota => Err(AppError::QuotaExceeded { required, quota }),
        _ => Ok(()),
    }
}

// =============================================================================
// File storage
// =============================================================================

/// Directory-backed storage, one file per key
///
/// Writes go to a temporary file in the same directory and are renamed
/// over the previous value, so a crash never leaves a half-written item.
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory
    ///
    /// # Arguments
    /// * `dir` - Directory holding one file per key
    /// * `quota` - Optional limit on the total bytes of keys plus values
    pub fn open(dir: impl Into<PathBuf>, quota: Option<usize>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(path = %dir.display(), ?quota, "File storage opened");
        Ok(Self { dir, quota })
    }

    fn item_path(&self, key: &str) -> Result<PathBuf, AppError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AppError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.{ITEM_EXTENSION}")))
    }

    /// Bytes used by every item except `skip_key`
    fn used_bytes_excluding(&self, skip_key: &str) -> Result<usize, AppError> {
        let mut used = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ITEM_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if key == skip_key {
                continue;
            }
            let len = fs::metadata(&path)?.len();
            used += key.len() + usize::try_from(len).unwrap_or(usize::MAX);
        }
        Ok(used)
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        let path = self.item_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        let path = self.item_path(key)?;

        if self.quota.is_some() {
            let required = self.used_bytes_excluding(key)? + key.len() + value.len();
            check_quota(self.quota, required)?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), AppError> {
        let path = self.item_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

// =============================================================================
// Memory storage
// =============================================================================

/// Volatile in-process storage
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new(quota: Option<usize>) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota,
        }
    }

    fn items(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AppError> {
        self.items
            .lock()
            .map_err(|_| AppError::Storage("memory storage lock poisoned".to_string()))
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut items = self.items()?;

        if self.quota.is_some() {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            check_quota(self.quota, used + key.len() + value.len())?;
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), AppError> {
        self.items()?.remove(key);
        Ok(())
    }
}
