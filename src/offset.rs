use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PersistenceError;

/// Identifier of the last update that was fully processed.
pub type Offset = i64;

/// Durable single-value store for the poller's offset.
pub trait OffsetStore: Send + Sync {
    /// `Ok(None)` means nothing was ever saved.
    fn load(&self) -> Result<Option<Offset>, PersistenceError>;

    /// Replace the stored value. After a crash either the old or the new
    /// value is readable, never a mix of both.
    fn save(&self, offset: Offset) -> Result<(), PersistenceError>;
}

/// Offset stored as a newline-terminated integer in a plain file.
pub struct FileOffsetStore {
    path: PathBuf,
}

impl FileOffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Make the rename itself durable. Best-effort.
    #[cfg(unix)]
    fn sync_parent_dir(&self) {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if let Ok(dir) = fs::File::open(dir) {
            let _ = dir.sync_all();
        }
    }

    #[cfg(not(unix))]
    fn sync_parent_dir(&self) {}
}

impl OffsetStore for FileOffsetStore {
    fn load(&self) -> Result<Option<Offset>, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        // i64::MAX leaves no room for the next id to be requested.
        match content.trim().parse::<Offset>() {
            Ok(offset) if offset < Offset::MAX => Ok(Some(offset)),
            _ => Err(PersistenceError::Corrupt {
                path: self.path.clone(),
                content,
            }),
        }
    }

    fn save(&self, offset: Offset) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
            writeln!(file, "{offset}").map_err(|e| self.io_error(e))?;
            file.sync_all().map_err(|e| self.io_error(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        self.sync_parent_dir();

        debug!("Offset {} saved to {}", offset, self.path.display());
        Ok(())
    }
}
