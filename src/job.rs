use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, instrument};

use crate::error::ProgramError;
use crate::store::Storage;

/// Identifies a download across runs: `hex(sha256(url)) + "_" + output_name`.
///
/// The same URL and name always map to the same destination, which is what
/// lets a later run pick up where an interrupted one stopped.
pub fn storage_key(url: &str, output_name: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{}_{}", hex::encode(digest), output_name)
}

/// Everything one invocation needs to know, fixed at construction.
#[derive(Clone, Debug)]
pub struct DownloadJob {
    url: String,
    output_name: String,
    storage_key: String,
    concurrency: usize,
    resume_offset: u64,
    storage: Storage,
}

impl DownloadJob {
    /// Validates the arguments and reads the resume offset from the destination.
    #[instrument(skip(url, storage), fields(url = %url.as_ref()))]
    pub async fn prepare(
        url: impl AsRef<str>,
        output_name: &str,
        concurrency: usize,
        storage: Storage,
    ) -> Result<Self, ProgramError> {
        let url = url.as_ref().to_string();
        if url.is_empty() {
            return Err(ProgramError::ArgNotValid("url must not be empty".to_string()));
        }
        if concurrency == 0 {
            return Err(ProgramError::ArgNotValid(
                "concurrency must be >= 1".to_string(),
            ));
        }
        validate_output_name(output_name)?;

        let storage_key = storage_key(&url, output_name);
        let resume_offset = storage.resume_offset(&storage_key).await?;
        debug!(storage_key = %storage_key, resume_offset, "Job prepared");

        Ok(Self {
            url,
            output_name: output_name.to_string(),
            storage_key,
            concurrency,
            resume_offset,
            storage,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn destination(&self) -> PathBuf {
        self.storage.destination(&self.storage_key)
    }
}

/// Output names become path components, so they must be bare file names.
fn validate_output_name(name: &str) -> Result<(), ProgramError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ProgramError::ArgNotValid(format!(
            "output must be a plain file name, got {:?}",
            name
        )));
    }
    Ok(())
}
