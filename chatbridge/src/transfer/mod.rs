//! Download lifecycle tracking.
//!
//! The [`TransferTracker`] owns one [`Transfer`] per backend file id and is
//! the only code that mutates it. Queue entries reference transfers by file
//! id; several entries may share one download.
//!
//! ```text
//! NotStarted ──begin──▶ Started ──progress──▶ Progressing ──▶ Completed
//!      │                   │                       │
//!      └───────────────────┴──── error / cancel ───┴────────▶ Failed
//! ```
//!
//! A transfer's temporary resource is released exactly once, when the
//! transfer is terminal and no queued entry references it any more.

pub mod resource;

use std::collections::HashMap;

use chatbridge_proto::backend::RequestId;
use chatbridge_proto::message::{FileId, RemoteFile};

use crate::delivery::entry::EntryKey;
use crate::delivery::render::{AttachmentDesc, AttachmentView, MessageDraft};
use crate::frontend::{BridgeEvent, FrontEnd};

pub use resource::{
    InMemoryResources, LocalResource, ResourceError, ResourceStore, TempDirStore, TransferHandle,
};

/// Lifecycle state of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Known but not requested yet.
    NotStarted,
    /// Requested; no bytes reported yet.
    Started,
    /// Bytes are arriving.
    Progressing,
    /// The file is available locally.
    Completed,
    /// The download failed or was cancelled.
    Failed,
}

impl TransferState {
    /// Whether the transfer has finished one way or the other.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One download and everything waiting on it.
#[derive(Debug)]
pub struct Transfer {
    file_id: FileId,
    state: TransferState,
    resource: Option<LocalResource>,
    local_path: Option<String>,
    bytes_transferred: u64,
    total_bytes: u64,
    request_id: Option<RequestId>,
    /// Queued entries that will read this transfer's state when emitted.
    referrers: Vec<EntryKey>,
    /// Emitted messages to rewrite when the download finishes.
    watchers: Vec<MessageDraft>,
}

impl Transfer {
    const fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            state: TransferState::NotStarted,
            resource: None,
            local_path: None,
            bytes_transferred: 0,
            total_bytes: 0,
            request_id: None,
            referrers: Vec::new(),
            watchers: Vec::new(),
        }
    }

    /// The backend file id.
    #[must_use]
    pub const fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TransferState {
        self.state
    }

    /// Final local path, once completed.
    #[must_use]
    pub fn local_path(&self) -> Option<&str> {
        self.local_path.as_deref()
    }

    /// Bytes received so far.
    #[must_use]
    pub const fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Expected size.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Handle of the temporary resource, while one is held.
    #[must_use]
    pub fn handle(&self) -> Option<TransferHandle> {
        self.resource.as_ref().map(LocalResource::handle)
    }

    /// The download request this transfer answers to.
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    /// Number of queued entries referencing this transfer.
    #[must_use]
    pub fn referrer_count(&self) -> usize {
        self.referrers.len()
    }

    /// Number of emitted messages waiting for the final content.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }
}

/// Owns every in-flight download and its temporary resource.
#[derive(Debug)]
pub struct TransferTracker<R: ResourceStore> {
    transfers: HashMap<FileId, Transfer>,
    /// Paths of downloads that completed and were retired.
    materialized: HashMap<FileId, String>,
    resources: R,
}

impl<R: ResourceStore> TransferTracker<R> {
    /// Creates an empty tracker allocating from `resources`.
    pub fn new(resources: R) -> Self {
        Self {
            transfers: HashMap::new(),
            materialized: HashMap::new(),
            resources,
        }
    }

    /// The resource store.
    pub const fn resources(&self) -> &R {
        &self.resources
    }

    /// Looks up a live transfer.
    #[must_use]
    pub fn get(&self, file_id: FileId) -> Option<&Transfer> {
        self.transfers.get(&file_id)
    }

    /// Local path of a file whose download completed earlier.
    #[must_use]
    pub fn materialized_path(&self, file_id: FileId) -> Option<&str> {
        self.materialized.get(&file_id).map(String::as_str)
    }

    /// Whether an existing transfer can be shared instead of downloading again.
    #[must_use]
    pub fn is_reusable(&self, file_id: FileId) -> bool {
        self.transfers
            .get(&file_id)
            .is_some_and(|t| t.state != TransferState::Failed)
    }

    /// Prepares a download: allocates its temporary resource.
    ///
    /// A failed transfer for the same file is restarted in place, keeping
    /// its referrers. Returns [`TransferState::Started`] when the download
    /// may be requested, or [`TransferState::Failed`] if allocation failed.
    pub fn begin(&mut self, file: &RemoteFile) -> TransferState {
        let mut transfer = self
            .transfers
            .remove(&file.id)
            .unwrap_or_else(|| Transfer::new(file.id));
        if let Some(stale) = transfer.resource.take() {
            self.release(stale);
        }
        transfer.state = TransferState::NotStarted;
        transfer.local_path = None;
        transfer.request_id = None;
        transfer.bytes_transferred = file.local.downloaded_size;
        transfer.total_bytes = file.size;

        match self.resources.allocate(file.id) {
            Ok(resource) => {
                tracing::debug!(file_id = %file.id, handle = %resource.handle(), "transfer started");
                transfer.resource = Some(resource);
                transfer.state = TransferState::Started;
            }
            Err(e) => {
                tracing::warn!(file_id = %file.id, error = %e, "could not allocate transfer resource");
                transfer.state = TransferState::Failed;
            }
        }
        let state = transfer.state;
        self.transfers.insert(file.id, transfer);
        state
    }

    /// Records the download request answering for this transfer.
    pub fn set_request(&mut self, file_id: FileId, request_id: RequestId) {
        if let Some(transfer) = self.transfers.get_mut(&file_id) {
            transfer.request_id = Some(request_id);
        }
    }

    /// Registers a queued entry as reading this transfer.
    pub fn add_referrer(&mut self, file_id: FileId, key: EntryKey) {
        if let Some(transfer) = self.transfers.get_mut(&file_id) {
            transfer.referrers.push(key);
        }
    }

    /// Drops a queued entry's reference, retiring the transfer if possible.
    pub fn remove_referrer(&mut self, file_id: FileId, key: EntryKey) {
        if let Some(transfer) = self.transfers.get_mut(&file_id) {
            transfer.referrers.retain(|&k| k != key);
        }
        self.retire_if_done(file_id);
    }

    /// How an entry referencing `file_id` should render right now.
    #[must_use]
    pub fn view(&self, file_id: FileId) -> AttachmentView<'_> {
        if let Some(transfer) = self.transfers.get(&file_id) {
            return match (transfer.state, transfer.local_path.as_deref()) {
                (TransferState::Completed, Some(path)) => AttachmentView::Completed(path),
                (TransferState::Completed | TransferState::Failed, _) => {
                    AttachmentView::Unavailable
                }
                _ => AttachmentView::Downloading,
            };
        }
        self.materialized_path(file_id)
            .map_or(AttachmentView::Unavailable, AttachmentView::Completed)
    }

    /// Shows an in-flight download to the user for an emitted message.
    ///
    /// The message's draft is kept so it can be rewritten on completion.
    pub fn watch<F: FrontEnd>(&mut self, file_id: FileId, draft: MessageDraft, frontend: &mut F) {
        let Some(transfer) = self.transfers.get_mut(&file_id) else {
            return;
        };
        let Some(handle) = transfer.handle() else {
            return;
        };
        frontend.emit(BridgeEvent::TransferStarted {
            handle,
            chat_id: draft.chat_id,
            message_id: draft.message_id,
            file_name: draft
                .attachment
                .as_ref()
                .map(AttachmentDesc::label)
                .unwrap_or_default(),
            total_bytes: transfer.total_bytes,
        });
        transfer.watchers.push(draft);
    }

    /// Applies a file state pushed by the backend.
    ///
    /// Returns the queued entries to unblock when the transfer became
    /// terminal, or `None` if it is still running (or unknown).
    pub fn on_file_update<F: FrontEnd>(
        &mut self,
        file: &RemoteFile,
        frontend: &mut F,
    ) -> Option<Vec<EntryKey>> {
        if file.completed_path().is_some() {
            return self.complete(file.id, file, frontend);
        }
        let transfer = self.transfers.get_mut(&file.id)?;
        if transfer.state.is_terminal() {
            return None;
        }
        // Once requested, an inactive and incomplete file is a stopped download.
        let requested =
            transfer.state == TransferState::Progressing || transfer.request_id.is_some();
        if requested && !file.local.is_downloading_active {
            tracing::info!(
                file_id = %file.id,
                state = ?transfer.state,
                "download stopped by backend"
            );
            return Some(self.fail(file.id, frontend));
        }
        if !file.local.is_downloading_active
            && file.local.downloaded_size <= transfer.bytes_transferred
        {
            return None;
        }

        transfer.state = TransferState::Progressing;
        transfer.bytes_transferred = file.local.downloaded_size;
        transfer.total_bytes = transfer.total_bytes.max(file.size);
        if let Some(handle) = transfer.handle() {
            for watcher in &transfer.watchers {
                frontend.emit(BridgeEvent::TransferProgress {
                    handle,
                    message_id: watcher.message_id,
                    bytes_transferred: transfer.bytes_transferred,
                    total_bytes: transfer.total_bytes,
                });
            }
        }
        None
    }

    /// Marks the transfer of `file_id` completed with `file`'s final local
    /// state (path and size).
    ///
    /// The transfer is looked up by `file_id`, not by the id inside `file`.
    /// Emitted messages watching the transfer are rewritten. Returns the
    /// queued entries to unblock; `None` if the transfer is not tracked or
    /// the file is not actually complete.
    pub fn complete<F: FrontEnd>(
        &mut self,
        file_id: FileId,
        file: &RemoteFile,
        frontend: &mut F,
    ) -> Option<Vec<EntryKey>> {
        let path = file.completed_path()?;
        if file.id != file_id {
            tracing::debug!(file_id = %file_id, reported = %file.id, "completion carries another file id");
        }
        let transfer = self.transfers.get_mut(&file_id)?;
        if transfer.state.is_terminal() {
            return None;
        }
        transfer.state = TransferState::Completed;
        transfer.local_path = Some(path.to_string());
        transfer.total_bytes = transfer
            .total_bytes
            .max(file.size)
            .max(file.local.downloaded_size);
        transfer.bytes_transferred = transfer.total_bytes;
        tracing::debug!(file_id = %file_id, path, "transfer completed");

        let handle = transfer.handle();
        for watcher in transfer.watchers.drain(..) {
            if let Some(handle) = handle {
                frontend.emit(BridgeEvent::TransferCompleted {
                    handle,
                    message_id: watcher.message_id,
                    path: path.to_string(),
                    total_bytes: transfer.total_bytes,
                });
            }
            frontend.emit(BridgeEvent::MessageUpdated {
                chat_id: watcher.chat_id,
                message_id: watcher.message_id,
                sender: watcher.sender.clone(),
                timestamp: watcher.timestamp,
                content: watcher.render(AttachmentView::Completed(path)),
            });
        }

        let referrers = transfer.referrers.clone();
        self.materialized.insert(file_id, path.to_string());
        self.retire_if_done(file_id);
        Some(referrers)
    }

    /// Marks a transfer failed (error or cancellation).
    ///
    /// Returns the queued entries to unblock. Failing a terminal or unknown
    /// transfer is a no-op.
    pub fn fail<F: FrontEnd>(&mut self, file_id: FileId, frontend: &mut F) -> Vec<EntryKey> {
        let Some(transfer) = self.transfers.get_mut(&file_id) else {
            return Vec::new();
        };
        if transfer.state.is_terminal() {
            return Vec::new();
        }
        transfer.state = TransferState::Failed;
        tracing::warn!(file_id = %file_id, "transfer failed");

        let handle = transfer.handle();
        for watcher in transfer.watchers.drain(..) {
            if let Some(handle) = handle {
                frontend.emit(BridgeEvent::TransferFailed {
                    handle,
                    message_id: watcher.message_id,
                });
            }
        }
        let referrers = transfer.referrers.clone();
        self.retire_if_done(file_id);
        referrers
    }

    /// File ids of every transfer that has not finished, sorted.
    #[must_use]
    pub fn in_flight(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = self
            .transfers
            .values()
            .filter(|t| !t.state.is_terminal())
            .map(Transfer::file_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live transfer records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// Whether no transfer records are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    fn retire_if_done(&mut self, file_id: FileId) {
        let done = self
            .transfers
            .get(&file_id)
            .is_some_and(|t| t.state.is_terminal() && t.referrers.is_empty());
        if !done {
            return;
        }
        if let Some(mut transfer) = self.transfers.remove(&file_id)
            && let Some(resource) = transfer.resource.take()
        {
            self.release(resource);
        }
    }

    fn release(&mut self, resource: LocalResource) {
        let handle = resource.handle();
        let file_id = resource.file_id();
        match self.resources.release(resource) {
            Ok(()) => tracing::debug!(file_id = %file_id, handle = %handle, "transfer resource released"),
            Err(e) => tracing::warn!(file_id = %file_id, error = %e, "failed to release transfer resource"),
        }
    }
}
