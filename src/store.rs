use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs::{self, DirBuilder};
use tracing::{debug, instrument};

use crate::error::ProgramError;

const TEMP_DIR_NAME: &str = "tmp";

#[cfg(unix)]
const BASE_DIR_MODE: u32 = 0o770;
#[cfg(unix)]
const TEMP_DIR_MODE: u32 = 0o777;

/// On-disk layout of a download:
///
/// ```text
/// {base}/{storage_key}              destination, doubles as the resume checkpoint
/// {base}/tmp/                       part files, removed when the run ends
/// {base}/tmp/{output}-{start}-{end} one part file per planned range
/// ```
#[derive(Clone, Debug)]
pub struct Storage {
    base_dir: PathBuf,
}

impl Storage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn destination(&self, storage_key: &str) -> PathBuf {
        self.base_dir.join(storage_key)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base_dir.join(TEMP_DIR_NAME)
    }

    /// Size of the destination on disk, or 0 if it does not exist yet.
    pub async fn resume_offset(&self, storage_key: &str) -> Result<u64, ProgramError> {
        match fs::metadata(self.destination(storage_key)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(base = ?self.base_dir))]
    pub async fn ensure_base_dir(&self) -> Result<(), ProgramError> {
        debug!("Ensuring base directory");
        #[cfg(unix)]
        let mode = Some(BASE_DIR_MODE);
        #[cfg(not(unix))]
        let mode = None;
        create_dir(&self.base_dir, mode).await
    }

    /// Creates the temp directory. An existing directory is reused.
    #[instrument(skip(self), fields(base = ?self.base_dir))]
    pub async fn create_temp_dir(&self) -> Result<PathBuf, ProgramError> {
        let dir = self.temp_dir();
        debug!(temp_dir = ?dir, "Creating temp directory");
        #[cfg(unix)]
        let mode = Some(TEMP_DIR_MODE);
        #[cfg(not(unix))]
        let mode = None;
        create_dir(&dir, mode).await?;
        Ok(dir)
    }

    /// Recursively removes the temp directory. A missing directory is fine.
    pub async fn remove_temp_dir(&self) -> Result<(), ProgramError> {
        let dir = self.temp_dir();
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(temp_dir = ?dir, "Temp directory removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg_attr(not(unix), allow(unused_variables))]
async fn create_dir(path: &Path, mode: Option<u32>) -> Result<(), ProgramError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    if let Some(mode) = mode {
        builder.mode(mode);
    }
    builder.create(path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resume_offset_is_zero_without_destination() {
        let root = tempfile::tempdir().unwrap();
        let storage = Storage::new(root.path());
        assert_eq!(storage.resume_offset("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resume_offset_is_destination_size() {
        let root = tempfile::tempdir().unwrap();
        let storage = Storage::new(root.path());
        fs::write(storage.destination("key"), vec![7u8; 40])
            .await
            .unwrap();
        assert_eq!(storage.resume_offset("key").await.unwrap(), 40);
    }

    #[tokio::test]
    async fn temp_dir_creation_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let storage = Storage::new(root.path().join("nested").join("base"));
        storage.ensure_base_dir().await.unwrap();
        storage.ensure_base_dir().await.unwrap();

        let first = storage.create_temp_dir().await.unwrap();
        fs::write(first.join("leftover"), b"x").await.unwrap();
        let second = storage.create_temp_dir().await.unwrap();
        assert_eq!(first, second);
        assert!(second.join("leftover").exists());
    }

    #[tokio::test]
    async fn remove_temp_dir_tolerates_absence() {
        let root = tempfile::tempdir().unwrap();
        let storage = Storage::new(root.path());
        storage.remove_temp_dir().await.unwrap();

        let dir = storage.create_temp_dir().await.unwrap();
        fs::write(dir.join("part"), b"abc").await.unwrap();
        storage.remove_temp_dir().await.unwrap();
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn base_dir_is_not_world_accessible() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("base");
        let storage = Storage::new(&base);
        storage.ensure_base_dir().await.unwrap();
        let mode = fs::metadata(&base)
            .await
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o007, 0);
    }
}
