//! Local temporary resources backing in-flight downloads.
//!
//! Defines the [`ResourceStore`] trait plus two implementations:
//! - [`TempDirStore`]: one placeholder file per download in a directory
//! - [`InMemoryResources`]: bookkeeping only, for tests
//!
//! A [`LocalResource`] is released by value and cannot be released twice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use chatbridge_proto::message::FileId;

/// Errors from allocating or releasing a local resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Creating or removing the backing file failed.
    #[error("temporary file {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The store refused to allocate.
    #[error("resource store unavailable: {0}")]
    Unavailable(String),
}

/// Identifies one download's local resource, shown to the transfer sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TransferHandle(Uuid);

impl TransferHandle {
    /// Creates a new time-ordered handle (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TransferHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A temporary resource held for the lifetime of one download.
#[derive(Debug, PartialEq, Eq)]
pub struct LocalResource {
    handle: TransferHandle,
    file_id: FileId,
    path: Option<PathBuf>,
}

impl LocalResource {
    /// The resource's handle.
    #[must_use]
    pub const fn handle(&self) -> TransferHandle {
        self.handle
    }

    /// The file this resource was allocated for.
    #[must_use]
    pub const fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Backing path, if the store uses the filesystem.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Allocates and releases temporary resources for downloads.
pub trait ResourceStore {
    /// Allocate a resource for a download that is about to start.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] if the resource cannot be created.
    fn allocate(&mut self, file_id: FileId) -> Result<LocalResource, ResourceError>;

    /// Release a resource. Consumes it.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] if cleanup fails. The resource is gone
    /// either way.
    fn release(&mut self, resource: LocalResource) -> Result<(), ResourceError>;
}

/// Stores each download's placeholder as an empty file in a directory.
#[derive(Debug, Clone)]
pub struct TempDirStore {
    dir: PathBuf,
}

impl TempDirStore {
    /// Creates a store writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory placeholders are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ResourceStore for TempDirStore {
    fn allocate(&mut self, file_id: FileId) -> Result<LocalResource, ResourceError> {
        let handle = TransferHandle::new();
        let path = self.dir.join(format!("chatbridge-{handle}.part"));
        std::fs::File::create(&path).map_err(|source| ResourceError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(file_id = %file_id, path = %path.display(), "allocated temporary file");
        Ok(LocalResource {
            handle,
            file_id,
            path: Some(path),
        })
    }

    fn release(&mut self, resource: LocalResource) -> Result<(), ResourceError> {
        let Some(path) = resource.path else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ResourceError::Io { path, source }),
        }
    }
}

/// Bookkeeping kept by [`InMemoryResources`].
#[derive(Debug, Default)]
struct Ledger {
    live: HashMap<TransferHandle, FileId>,
    allocated: Vec<TransferHandle>,
    released: Vec<TransferHandle>,
    refuse_allocations: bool,
}

/// Resource store that only keeps a ledger, for tests.
///
/// Clones share one ledger, so a test can keep a clone and inspect what the
/// engine allocated and released.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResources {
    ledger: Arc<parking_lot::Mutex<Ledger>>,
}

impl InMemoryResources {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later allocation fail.
    pub fn refuse_allocations(&self) {
        self.ledger.lock().refuse_allocations = true;
    }

    /// Handles allocated so far, in order.
    #[must_use]
    pub fn allocated(&self) -> Vec<TransferHandle> {
        self.ledger.lock().allocated.clone()
    }

    /// Handles released so far, in order.
    #[must_use]
    pub fn released(&self) -> Vec<TransferHandle> {
        self.ledger.lock().released.clone()
    }

    /// Number of resources currently held.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.ledger.lock().live.len()
    }

    /// Whether a resource for `file_id` is currently held.
    #[must_use]
    pub fn is_live(&self, file_id: FileId) -> bool {
        self.ledger.lock().live.values().any(|&id| id == file_id)
    }
}

impl ResourceStore for InMemoryResources {
    fn allocate(&mut self, file_id: FileId) -> Result<LocalResource, ResourceError> {
        let mut ledger = self.ledger.lock();
        if ledger.refuse_allocations {
            return Err(ResourceError::Unavailable("allocations refused".into()));
        }
        let handle = TransferHandle::new();
        ledger.live.insert(handle, file_id);
        ledger.allocated.push(handle);
        Ok(LocalResource {
            handle,
            file_id,
            path: None,
        })
    }

    fn release(&mut self, resource: LocalResource) -> Result<(), ResourceError> {
        let mut ledger = self.ledger.lock();
        if ledger.live.remove(&resource.handle).is_none() {
            return Err(ResourceError::Unavailable(format!(
                "resource {} is not live",
                resource.handle
            )));
        }
        ledger.released.push(resource.handle);
        Ok(())
    }
}
