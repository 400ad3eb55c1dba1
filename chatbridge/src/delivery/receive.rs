//! Routing of backend responses and file updates back to queued entries.

use std::collections::BTreeSet;

use chatbridge_proto::backend::{BackendError, BackendResponse, RequestId};
use chatbridge_proto::message::{ChatId, FileId, MessageId, RemoteFile};

use crate::backend::Backend;
use crate::frontend::FrontEnd;
use crate::transfer::{ResourceStore, Transfer};

use super::Engine;
use super::entry::{DependencyKind, EntryKey, ReplyState};
use super::resolver::PendingRequest;

impl<B: Backend, F: FrontEnd, R: ResourceStore> Engine<B, F, R> {
    /// Clears one dependency of a queued entry, then flushes its conversation.
    ///
    /// Returns the number of entries emitted. Keys of entries that already
    /// left the queue are ignored.
    pub fn on_dependency_resolved(&mut self, key: EntryKey, kind: DependencyKind) -> usize {
        if self.clear_dependency(key, kind) {
            self.flush_ready(key.0)
        } else {
            0
        }
    }

    /// Routes a response to whatever issued its request.
    pub(super) fn on_response(
        &mut self,
        request_id: RequestId,
        result: Result<BackendResponse, BackendError>,
    ) {
        let Some(pending) = self.resolver.take(request_id) else {
            tracing::warn!(request_id = %request_id, "response for unknown request discarded");
            return;
        };
        match pending {
            PendingRequest::ReplyFetch {
                chat_id,
                message_id,
                waiters,
            } => self.on_reply_fetched(chat_id, message_id, &waiters, result),
            PendingRequest::Download { file_id } => {
                self.on_download_finished(request_id, file_id, result);
            }
            PendingRequest::CancelDownload { file_id } => {
                if let Err(e) = result {
                    tracing::debug!(file_id = %file_id, error = %e, "cancel request refused");
                }
            }
            PendingRequest::Acknowledge { chat_id, count } => {
                super::ack::on_acknowledged(chat_id, count, &result);
            }
        }
    }

    /// Applies a file state pushed by the backend.
    pub(super) fn on_file_update(&mut self, file: &RemoteFile) {
        if let Some(unblocked) = self.transfers.on_file_update(file, &mut self.frontend) {
            self.release_attachments(unblocked);
        }
    }

    fn on_reply_fetched(
        &mut self,
        chat_id: ChatId,
        target: MessageId,
        waiters: &[u64],
        result: Result<BackendResponse, BackendError>,
    ) {
        let reply = match result {
            Ok(BackendResponse::Message(found)) => {
                tracing::debug!(chat_id = %chat_id, target = %target, "reply target fetched");
                self.resolver.remember(found.clone());
                ReplyState::Resolved(Box::new(found))
            }
            Ok(other) => {
                tracing::warn!(chat_id = %chat_id, target = %target, response = ?other, "unexpected reply fetch payload");
                ReplyState::Unavailable
            }
            Err(e) => {
                tracing::info!(chat_id = %chat_id, target = %target, error = %e, "reply target unavailable");
                ReplyState::Unavailable
            }
        };

        let mut changed = false;
        for &seq in waiters {
            if let Some(entry) = self
                .queues
                .get_mut(&chat_id)
                .and_then(|queue| queue.get_mut(seq))
            {
                entry.reply = reply.clone();
            }
            changed |= self.clear_dependency((chat_id, seq), DependencyKind::ReplyFetch);
        }
        if changed {
            self.flush_ready(chat_id);
        }
    }

    fn on_download_finished(
        &mut self,
        request_id: RequestId,
        file_id: FileId,
        result: Result<BackendResponse, BackendError>,
    ) {
        if self.transfers.get(file_id).and_then(Transfer::request_id) != Some(request_id) {
            tracing::debug!(file_id = %file_id, request_id = %request_id, "stale download response ignored");
            return;
        }
        let unblocked = match result {
            Ok(BackendResponse::File(file)) if file.completed_path().is_some() => self
                .transfers
                .complete(file_id, &file, &mut self.frontend)
                .unwrap_or_default(),
            Ok(other) => {
                tracing::warn!(file_id = %file_id, response = ?other, "download ended without a local file");
                self.transfers.fail(file_id, &mut self.frontend)
            }
            Err(e) => {
                tracing::warn!(file_id = %file_id, error = %e, "download failed");
                self.transfers.fail(file_id, &mut self.frontend)
            }
        };
        self.release_attachments(unblocked);
    }

    /// Clears the attachment dependency of every key and flushes the
    /// affected conversations once each, in id order.
    pub(super) fn release_attachments(&mut self, keys: Vec<EntryKey>) -> usize {
        let chats: BTreeSet<ChatId> = keys
            .into_iter()
            .filter(|&key| self.clear_dependency(key, DependencyKind::AttachmentFetch))
            .map(|(chat_id, _)| chat_id)
            .collect();
        chats.into_iter().map(|chat_id| self.flush_ready(chat_id)).sum()
    }

    /// Clears a dependency without flushing. Returns whether it was pending.
    fn clear_dependency(&mut self, (chat_id, seq): EntryKey, kind: DependencyKind) -> bool {
        self.queues
            .get_mut(&chat_id)
            .and_then(|queue| queue.get_mut(seq))
            .is_some_and(|entry| entry.resolve(kind))
    }
}
