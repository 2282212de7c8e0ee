//! Token persistence backends.
//!
//! The connection core treats the token as an opaque string; where it is
//! kept between runs is a platform concern behind [`TokenStore`]. The
//! connection manager only ever clears a stored token (on auth rejection);
//! saving and loading are the application shell's business.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use thiserror::Error;

/// Errors returned by token store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenStoreError {
    /// Store backend failure (filesystem, lock).
    #[error("token store backend failure: {0}")]
    Backend(String),
}

/// Pluggable persistence for the auth token.
pub trait TokenStore: Send + Sync {
    /// Persist the token, replacing any previous one.
    fn save(&self, token: &str) -> Result<(), TokenStoreError>;

    /// Load the persisted token, when one exists.
    fn load(&self) -> Result<Option<String>, TokenStoreError>;

    /// Remove the persisted token. A missing token is not an error.
    fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Process-local store, used in tests and for ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore for InMemoryTokenStore {
    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| TokenStoreError::Backend("poisoned lock".to_owned()))?;
        *slot = Some(token.to_owned());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        let slot = self
            .token
            .read()
            .map_err(|_| TokenStoreError::Backend("poisoned lock".to_owned()))?;
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| TokenStoreError::Backend("poisoned lock".to_owned()))?;
        *slot = None;
        Ok(())
    }
}

/// Single-file store with atomic replace-on-save.
#[derive(Clone, Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = self
            .path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("token");
        parent.join(format!(".{file_name}.tmp"))
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| TokenStoreError::Backend(err.to_string()))?;
        }

        let temp_path = self.temp_path();
        fs::write(&temp_path, token).map_err(|err| TokenStoreError::Backend(err.to_string()))?;

        if let Err(rename_err) = fs::rename(&temp_path, &self.path) {
            // Windows does not allow replacing existing files via rename.
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    let _ = fs::remove_file(&temp_path);
                    return Err(TokenStoreError::Backend(format!(
                        "replace after rename error ({rename_err}): {err}"
                    )));
                }
            }
            fs::rename(&temp_path, &self.path).map_err(|err| {
                let _ = fs::remove_file(&temp_path);
                TokenStoreError::Backend(err.to_string())
            })?;
        }

        Ok(())
    }

    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim().to_owned();
                Ok((!token.is_empty()).then_some(token))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TokenStoreError::Backend(err.to_string())),
        }
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TokenStoreError::Backend(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn unique_temp_path(label: &str) -> PathBuf {
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        env::temp_dir().join(format!("ternchat-{label}-{now_nanos}.token"))
    }

    #[test]
    fn in_memory_roundtrip() {
        let store = InMemoryTokenStore::default();
        assert_eq!(store.load().expect("load should work"), None);

        store.save("h.c.s").expect("save should work");
        assert_eq!(store.load().expect("load should work").as_deref(), Some("h.c.s"));

        store.clear().expect("clear should work");
        assert_eq!(store.load().expect("load should work"), None);
        store.clear().expect("clearing again should be a no-op");
    }

    #[test]
    fn file_roundtrip_and_missing_file_tolerance() {
        let path = unique_temp_path("roundtrip");
        let store = FileTokenStore::new(&path);

        assert_eq!(store.load().expect("load before save should work"), None);
        store.clear().expect("clear before save should be a no-op");

        store.save("h.c.s").expect("save should work");
        assert_eq!(store.load().expect("load should work").as_deref(), Some("h.c.s"));

        store.save("h2.c2.s2").expect("overwrite should work");
        assert_eq!(
            store.load().expect("load should work").as_deref(),
            Some("h2.c2.s2")
        );

        store.clear().expect("clear should work");
        assert_eq!(store.load().expect("load after clear should work"), None);
    }

    #[test]
    fn blank_file_loads_as_no_token() {
        let path = unique_temp_path("blank");
        fs::write(&path, "  \n").expect("test file write should work");
        let store = FileTokenStore::new(&path);

        assert_eq!(store.load().expect("load should work"), None);
        let _ = fs::remove_file(&path);
    }
}
