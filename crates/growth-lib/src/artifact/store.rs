//! Filesystem-backed artifact cache
//!
//! Entries are plain files named after the artifact. Validity is judged from
//! the file modification time, so a rewrite refreshes the entry.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Default cache entry lifetime (2 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(7200);

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Local artifact cache with TTL-based validity
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    ttl: Duration,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// True if any copy exists, fresh or expired
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Time since the entry was last written
    pub fn age(&self, name: &str) -> Option<Duration> {
        let modified = fs::metadata(self.path_for(name))
            .and_then(|m| m.modified())
            .ok()?;

        // mtime in the future (clock skew) counts as brand new
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// True iff a copy exists and is younger than the TTL
    pub fn is_valid(&self, name: &str) -> bool {
        match self.age(name) {
            Some(age) => age < self.ttl,
            None => false,
        }
    }

    /// Read a cached entry; `ErrorKind::NotFound` when absent
    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(name))
    }

    /// Replace the entry for `name` with `bytes`.
    ///
    /// Writes a sibling temp file and renames it into place, so readers see
    /// either the previous snapshot or the new one. Concurrent writers race
    /// and the last rename wins.
    pub fn write(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(name);
        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result =
            Self::write_file(&temp_path, bytes).and_then(|_| fs::rename(&temp_path, &path));
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        debug!(name = %name, path = %path.display(), size = bytes.len(), "Cached artifact written");
        Ok(path)
    }

    fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}
