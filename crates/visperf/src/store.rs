//! Baseline image store.
//!
//! One directory, one `{subject}.png` per subject plus an optional
//! `{subject}.diff.png` artifact. Every write goes to a temporary file in the
//! same directory, is flushed to disk, and is then renamed over the target, so
//! a concurrent reader sees either the previous file or the new one in full.

use crate::result::{VisperfError, VisperfResult};
use crate::subject::{Subject, DERIVED_SUFFIX};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default directory for baselines, relative to the working directory
pub const DEFAULT_BASELINES_DIR: &str = ".visual-perfect-baselines";

const IMAGE_EXTENSION: &str = "png";

/// Acknowledgement of a durable write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// SHA-256 of the stored bytes, lowercase hex
    pub digest: String,
    /// Size in bytes
    pub size: usize,
}

/// Content store for baseline images
#[derive(Debug, Clone)]
pub struct BaselineStore {
    root: PathBuf,
}

impl BaselineStore {
    /// Open a store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(root: impl Into<PathBuf>) -> VisperfResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| VisperfError::WriteError {
            path: root.clone(),
            source,
        })?;
        debug!(root = %root.display(), "baseline store opened");
        Ok(Self { root })
    }

    /// Directory holding the baselines
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the baseline for `subject`
    #[must_use]
    pub fn baseline_path(&self, subject: &Subject) -> PathBuf {
        self.root.join(format!("{subject}.{IMAGE_EXTENSION}"))
    }

    /// Path of the derived diff artifact for `subject`
    #[must_use]
    pub fn diff_path(&self, subject: &Subject) -> PathBuf {
        self.root
            .join(format!("{subject}{DERIVED_SUFFIX}.{IMAGE_EXTENSION}"))
    }

    /// Whether a baseline is stored for `subject`
    #[must_use]
    pub fn exists(&self, subject: &Subject) -> bool {
        self.baseline_path(subject).is_file()
    }

    /// Read the stored baseline
    ///
    /// # Errors
    ///
    /// Returns `BaselineNotFound` if none is stored, or an I/O error
    pub fn load(&self, subject: &Subject) -> VisperfResult<Vec<u8>> {
        match fs::read(self.baseline_path(subject)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(VisperfError::BaselineNotFound {
                subject: subject.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the stored baseline if there is one
    ///
    /// # Errors
    ///
    /// Returns an I/O error for anything other than a missing file
    pub fn try_load(&self, subject: &Subject) -> VisperfResult<Option<Vec<u8>>> {
        match self.load(subject) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(VisperfError::BaselineNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the baseline for `subject` with `image`
    ///
    /// # Errors
    ///
    /// Returns `WriteError` if the bytes cannot be made durable; the previous
    /// baseline is left untouched in that case
    pub fn write(&self, subject: &Subject, image: &[u8]) -> VisperfResult<StoredImage> {
        let path = self.baseline_path(subject);
        let stored = self.write_atomic(subject, &path, image)?;
        info!(
            subject = %subject,
            digest = %stored.digest,
            size = stored.size,
            "baseline written"
        );
        Ok(stored)
    }

    /// Persist the diff artifact for `subject`
    ///
    /// # Errors
    ///
    /// Returns `WriteError` if the bytes cannot be made durable
    pub fn write_diff(&self, subject: &Subject, image: &[u8]) -> VisperfResult<StoredImage> {
        let path = self.diff_path(subject);
        let stored = self.write_atomic(subject, &path, image)?;
        debug!(subject = %subject, size = stored.size, "diff artifact written");
        Ok(stored)
    }

    /// Remove any derived artifact for `subject`
    ///
    /// # Errors
    ///
    /// Returns an I/O error other than the artifact being absent
    pub fn remove_derived(&self, subject: &Subject) -> VisperfResult<()> {
        match fs::remove_file(self.diff_path(subject)) {
            Ok(()) => {
                debug!(subject = %subject, "diff artifact removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// SHA-256 digest of the stored baseline
    ///
    /// # Errors
    ///
    /// Returns `BaselineNotFound` if none is stored
    pub fn digest(&self, subject: &Subject) -> VisperfResult<String> {
        self.load(subject).map(|bytes| content_digest(&bytes))
    }

    /// Subjects that have a baseline, sorted
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read
    pub fn list(&self) -> VisperfResult<Vec<Subject>> {
        let mut subjects = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Derived artifacts and stray files fail validation and are skipped.
            if let Ok(subject) = Subject::new(stem) {
                subjects.push(subject);
            }
        }
        subjects.sort();
        Ok(subjects)
    }

    fn write_atomic(
        &self,
        subject: &Subject,
        path: &Path,
        bytes: &[u8],
    ) -> VisperfResult<StoredImage> {
        let write_error = |source| VisperfError::WriteError {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{subject}."))
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(write_error)?;
        tmp.write_all(bytes).map_err(write_error)?;
        tmp.as_file().sync_all().map_err(write_error)?;
        tmp.persist(path).map_err(|e| write_error(e.error))?;
        sync_dir(&self.root).map_err(write_error)?;

        Ok(StoredImage {
            digest: content_digest(bytes),
            size: bytes.len(),
        })
    }
}

/// Lowercase hex SHA-256 of `bytes`
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
