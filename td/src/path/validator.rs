//! PathValidator - the only place file paths are resolved
//!
//! Every path the engine reads or writes comes through [`PathValidator::validate`]
//! or [`PathValidator::validate_async`]. The first is purely lexical; the second
//! also follows symlinks so a link inside the sandbox cannot point out of it.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::error::PathError;

/// Sandbox rooted at one base directory
#[derive(Debug)]
pub struct PathValidator {
    /// Absolute, lexically normalized
    base: PathBuf,
    /// Symlink-resolved `base`, computed on first async use
    real_base: OnceCell<PathBuf>,
}

impl PathValidator {
    /// Create a validator for `base`; relative bases resolve against the cwd
    pub fn new(base: impl AsRef<Path>) -> Result<Self, PathError> {
        let base = base.as_ref();
        debug!(?base, "PathValidator::new: called");
        let absolute = std::path::absolute(base)?;
        Ok(Self {
            base: normalize(&absolute),
            real_base: OnceCell::new(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// The base with symlinks resolved; falls back to the lexical base when it
    /// does not exist yet
    pub async fn real_base_path(&self) -> &Path {
        self.real_base
            .get_or_init(|| async {
                match tokio::fs::canonicalize(&self.base).await {
                    Ok(real) => real,
                    Err(e) => {
                        debug!(error = %e, base = ?self.base, "PathValidator: base not resolvable, using lexical path");
                        self.base.clone()
                    }
                }
            })
            .await
    }

    /// Lexical validation: resolve against the base and require the result to
    /// stay inside it
    pub fn validate(&self, path: impl AsRef<Path>) -> Result<PathBuf, PathError> {
        let path = path.as_ref();
        debug!(?path, "PathValidator::validate: called");

        if path.as_os_str().is_empty() {
            return Err(PathError::Empty);
        }
        if path.as_os_str().as_encoded_bytes().contains(&0) {
            warn!(?path, "PathValidator::validate: NUL byte rejected");
            return Err(PathError::NullByte);
        }

        let resolved = normalize(&self.base.join(path));

        if !resolved.starts_with(&self.base) {
            warn!(?path, ?resolved, base = ?self.base, "PathValidator::validate: traversal rejected");
            return Err(PathError::Traversal {
                path: path.to_path_buf(),
                base: self.base.clone(),
            });
        }

        if cfg!(windows) && has_alternate_data_stream(&resolved) {
            warn!(?resolved, "PathValidator::validate: alternate data stream rejected");
            return Err(PathError::AlternateDataStream { path: resolved });
        }

        Ok(resolved)
    }

    /// [`validate`](Self::validate) plus symlink resolution
    ///
    /// Existing paths are returned as their real path, which must live under
    /// the base's real path. Paths that do not exist yet are returned
    /// unresolved after checking that their nearest existing ancestor inside
    /// the sandbox does not escape through a link.
    pub async fn validate_async(&self, path: impl AsRef<Path>) -> Result<PathBuf, PathError> {
        let path = path.as_ref();
        debug!(?path, "PathValidator::validate_async: called");
        let candidate = self.validate(path)?;
        let real_base = self.real_base_path().await.to_path_buf();

        match tokio::fs::canonicalize(&candidate).await {
            Ok(real) => {
                if real.starts_with(&real_base) {
                    debug!(?real, "PathValidator::validate_async: resolved inside sandbox");
                    Ok(real)
                } else {
                    warn!(?candidate, ?real, "PathValidator::validate_async: symlink traversal rejected");
                    Err(PathError::SymlinkTraversal {
                        path: path.to_path_buf(),
                        target: real,
                        base: real_base,
                    })
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(?candidate, "PathValidator::validate_async: path does not exist yet");
                self.check_nearest_ancestor(path, &candidate, &real_base).await?;
                Ok(candidate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_nearest_ancestor(&self, path: &Path, candidate: &Path, real_base: &Path) -> Result<(), PathError> {
        let mut ancestor = candidate.parent();
        while let Some(dir) = ancestor {
            if !dir.starts_with(&self.base) {
                return Ok(());
            }
            match tokio::fs::canonicalize(dir).await {
                Ok(real) if real.starts_with(real_base) => return Ok(()),
                Ok(real) => {
                    warn!(?dir, ?real, "PathValidator: parent directory links outside sandbox");
                    return Err(PathError::SymlinkTraversal {
                        path: path.to_path_buf(),
                        target: real,
                        base: real_base.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => ancestor = dir.parent(),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Fail when the file at `path` is larger than `max_bytes`
    pub async fn validate_file_size(&self, path: impl AsRef<Path>, max_bytes: u64) -> Result<(), PathError> {
        let resolved = self.validate_async(path).await?;
        let size = tokio::fs::metadata(&resolved).await?.len();
        if size > max_bytes {
            return Err(PathError::FileTooLarge {
                path: resolved,
                size,
                max: max_bytes,
            });
        }
        Ok(())
    }

    /// Whether `path` is valid and exists
    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        match self.validate_async(path).await {
            Ok(resolved) => tokio::fs::try_exists(&resolved).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Whether `path` is valid and can be opened for reading
    pub async fn is_readable(&self, path: impl AsRef<Path>) -> bool {
        match self.validate_async(path).await {
            Ok(resolved) => tokio::fs::File::open(&resolved).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Whether `path` is valid and could be written: an existing writable file,
    /// or a missing file whose parent is a writable directory
    pub async fn is_writable(&self, path: impl AsRef<Path>) -> bool {
        let Ok(resolved) = self.validate_async(path).await else {
            return false;
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) => meta.is_file() && !meta.permissions().readonly(),
            Err(_) => match resolved.parent() {
                Some(parent) => tokio::fs::metadata(parent)
                    .await
                    .map(|m| m.is_dir() && !m.permissions().readonly())
                    .unwrap_or(false),
                None => false,
            },
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// More than one `:` means a stream suffix after the drive letter
fn has_alternate_data_stream(path: &Path) -> bool {
    path.to_string_lossy().matches(':').count() > 1
}
