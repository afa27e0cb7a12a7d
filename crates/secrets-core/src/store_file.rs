//! Persistence boundary: one sealed file per store.
//!
//! Writes go to a staging file in the store's own directory, are synced, and
//! are then renamed over the target, so a reader only ever sees the previous
//! complete file or the new complete file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::codec;
use crate::crypto::{Credential, KdfParams, StoreKey};
use crate::envelope;
use crate::error::{Result, StoreError};
use crate::key_cache::KeyCache;
use crate::schema::Schema;
use crate::store::Store;

pub const STORE_EXTENSION: &str = "sec";
const STAGING_SUFFIX: &str = ".staging";
const STAGING_RAND_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFile {
    path: PathBuf,
}

impl StoreFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<name>.sec`
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(|c: char| c == '/' || c == '\\' || c.is_control())
        {
            return Err(StoreError::validation(format!("invalid store name '{name}'")));
        }
        Ok(Self::new(
            dir.as_ref().join(format!("{name}.{STORE_EXTENSION}")),
        ))
    }

    /// Names of the stores found in `dir`, sorted. A missing directory simply
    /// holds no stores.
    pub fn list(dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let entries = match fs::read_dir(dir.as_ref()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Stable identity for key caching: the absolute path.
    pub fn identity(&self) -> String {
        std::path::absolute(&self.path)
            .unwrap_or_else(|_| self.path.clone())
            .display()
            .to_string()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write a new, empty store sealed under a fresh salt.
    pub fn create(
        &self,
        schema: Schema,
        passphrase: &str,
        params: KdfParams,
    ) -> Result<(Store, StoreKey)> {
        if self.exists() {
            return Err(StoreError::PathExists(self.path.clone()));
        }
        let dir = self.dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            restrict_dir_permissions(&dir);
        }
        let key = StoreKey::generate(passphrase, params)?;
        let store = Store::new(schema);
        self.write(&store, &key, false)?;
        info!(path = %self.path.display(), fields = store.schema().len(), "store created");
        Ok((store, key))
    }

    /// Read, authenticate and decode the store. The key that opened it is
    /// returned for the follow-up save.
    pub fn open(&self, credential: Credential<'_>) -> Result<(Store, StoreKey)> {
        let blob = self.read()?;
        let (plaintext, key) = envelope::unlock(&blob, credential)?;
        let store = codec::decode(&plaintext)?;
        debug!(path = %self.path.display(), records = store.len(), "store opened");
        Ok((store, key))
    }

    pub fn save(&self, store: &Store, key: &StoreKey) -> Result<()> {
        if !self.exists() {
            return Err(StoreError::PathNotFound(self.path.clone()));
        }
        self.write(store, key, true)?;
        debug!(path = %self.path.display(), records = store.len(), "store saved");
        Ok(())
    }

    pub fn destroy(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "store destroyed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::PathNotFound(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-seal the store under `new_passphrase` with a fresh salt. Nothing on
    /// disk changes unless `old` opens the store.
    pub fn rotate_key(
        &self,
        old: Credential<'_>,
        new_passphrase: &str,
        params: KdfParams,
        cache: Option<&dyn KeyCache>,
    ) -> Result<StoreKey> {
        let (store, _old_key) = self.open(old)?;
        let key = StoreKey::generate(new_passphrase, params)?;
        self.write(&store, &key, true)?;
        if let Some(cache) = cache {
            if let Err(e) = cache.invalidate(&self.identity()) {
                warn!(error = %e, "could not drop cached key after rotation");
            }
        }
        info!(path = %self.path.display(), "store key rotated");
        Ok(key)
    }

    fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::PathNotFound(self.path.clone()),
            _ => StoreError::Io(e),
        })
    }

    fn write(&self, store: &Store, key: &StoreKey, replace: bool) -> Result<()> {
        let plaintext = codec::encode(store)?;
        let sealed = envelope::encrypt(&plaintext, key)?;
        self.cleanup_staging();
        let staged = self.stage(&sealed)?;
        self.commit(staged, replace)
    }

    /// Write `bytes` to a synced staging file next to the target.
    pub(crate) fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        let mut staged = tempfile::Builder::new()
            .prefix(&self.staging_prefix())
            .suffix(STAGING_SUFFIX)
            .rand_bytes(STAGING_RAND_LEN)
            .tempfile_in(self.dir())?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        Ok(staged)
    }

    /// Rename the staging file over the target and sync the directory entry.
    pub(crate) fn commit(&self, staged: NamedTempFile, replace: bool) -> Result<()> {
        let persisted = if replace {
            staged.persist(&self.path)
        } else {
            staged.persist_noclobber(&self.path)
        };
        persisted.map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                StoreError::PathExists(self.path.clone())
            } else {
                StoreError::Io(e.error)
            }
        })?;
        fsync_dir(&self.dir())
    }

    fn staging_prefix(&self) -> String {
        format!(".{}.", self.name())
    }

    /// Remove staging files a crashed write of this store left behind.
    fn cleanup_staging(&self) {
        let Ok(entries) = fs::read_dir(self.dir()) else {
            return;
        };
        let prefix = self.staging_prefix();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let orphaned = name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(STAGING_SUFFIX))
                .is_some_and(|rand| {
                    rand.len() == STAGING_RAND_LEN && rand.chars().all(|c| c.is_ascii_alphanumeric())
                });
            if orphaned {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn restrict_dir_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
}

fn fsync_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = OpenOptions::new().read(true).open(path)?;
        dir.sync_all()?;
    }
    Ok(())
}
