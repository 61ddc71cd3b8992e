//! Local on-disk cache for discovery documents and other GET responses.
//!
//! # Design
//! The cache directory lives at `~/.cache/arvados/<label>`. If it cannot be
//! created the caller simply runs without a cache; that is never an error.
//!
//! Entries are one file per URL, named by the SHA-256 of the URL. Writes go
//! to a temporary file in the same directory and are renamed into place, so
//! concurrent writers from several processes never expose a torn entry; the
//! last rename wins.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::env::Env;

/// Resolve (creating if needed) `~/.cache/arvados/<label>`.
///
/// Returns `None` when there is no home directory or the directory cannot be
/// created; callers treat that as "caching disabled".
pub fn discovery_cache_dir(env: &dyn Env, label: &str) -> Option<PathBuf> {
    let path = env.home_dir()?.join(".cache").join("arvados").join(label);
    match std::fs::create_dir_all(&path) {
        Ok(()) => Some(path),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cache directory unavailable, caching disabled");
            None
        }
    }
}

/// Directory-backed key/value store keyed by URL.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache for `label` under the user's cache directory, if available.
    pub fn open(env: &dyn Env, label: &str) -> Option<Self> {
        discovery_cache_dir(env, label).map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.dir.join(format!("{}.tmp", hex::encode(digest)))
    }

    /// Stored bytes for `url`. Unreadable or missing entries are misses.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        std::fs::read(self.entry_path(url)).ok()
    }

    /// Atomically store `content` for `url`.
    pub fn set(&self, url: &str, content: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.persist(self.entry_path(url)).map_err(|err| err.error)?;
        Ok(())
    }

    /// Remove the entry for `url`; a missing entry is fine.
    pub fn delete(&self, url: &str) -> io::Result<()> {
        match std::fs::remove_file(self.entry_path(url)) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::StaticEnv;

    const URL: &str = "https://zzzzz.example/discovery/v1/apis/arvados/v1/rest";

    #[test]
    fn resolve_creates_directory() {
        let home = tempfile::tempdir().unwrap();
        let dir = discovery_cache_dir(&StaticEnv::new(home.path()), "discovery").unwrap();
        assert_eq!(dir, home.path().join(".cache/arvados/discovery"));
        assert!(dir.is_dir());
    }

    #[test]
    fn resolve_is_idempotent() {
        let home = tempfile::tempdir().unwrap();
        let env = StaticEnv::new(home.path());
        let first = discovery_cache_dir(&env, "discovery").unwrap();
        let second = discovery_cache_dir(&env, "discovery").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_failure_means_unavailable() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".cache"), b"not a directory").unwrap();
        assert!(discovery_cache_dir(&StaticEnv::new(home.path()), "discovery").is_none());
    }

    #[test]
    fn resolve_without_home_is_unavailable() {
        assert!(DiskCache::open(&StaticEnv::default(), "discovery").is_none());
    }

    #[test]
    fn set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        assert_eq!(cache.get(URL), None);
        cache.set(URL, b"{\"kind\":\"discovery#restDescription\"}").unwrap();
        assert_eq!(
            cache.get(URL).as_deref(),
            Some(&b"{\"kind\":\"discovery#restDescription\"}"[..])
        );
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.set(URL, b"first").unwrap();
        cache.set(URL, b"second").unwrap();
        assert_eq!(cache.get(URL).as_deref(), Some(&b"second"[..]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn entries_are_keyed_by_url() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.set(URL, b"v1").unwrap();
        assert_eq!(cache.get(&URL.replace("v1", "v2")), None);
    }

    #[test]
    fn delete_removes_entry_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.set(URL, b"doc").unwrap();
        cache.delete(URL).unwrap();
        assert_eq!(cache.get(URL), None);
        cache.delete(URL).unwrap();
    }
}
