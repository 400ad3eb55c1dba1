//! Emission: ready-prefix flushes, forced flushes, timeouts and teardown.

use std::time::Instant;

use chatbridge_proto::backend::BackendRequest;
use chatbridge_proto::message::{ChatId, FileId};

use crate::backend::Backend;
use crate::frontend::{BridgeEvent, FrontEnd};
use crate::transfer::ResourceStore;

use super::Engine;
use super::entry::{DependencyKind, Entry, ReplyState};
use super::policy::AttachmentPolicy;
use super::queue::DeliveryQueue;
use super::render::{AttachmentView, MessageDraft, Quote, quoted_text};
use super::resolver::PendingRequest;

impl<B: Backend, F: FrontEnd, R: ResourceStore> Engine<B, F, R> {
    /// Emits the ready prefix of a conversation's queue as one batch.
    ///
    /// Returns the number of entries emitted.
    pub fn flush_ready(&mut self, chat_id: ChatId) -> usize {
        let Some(queue) = self.queues.get_mut(&chat_id) else {
            return 0;
        };
        let batch = queue.take_ready_prefix();
        self.emit_batch(chat_id, batch, false)
    }

    /// Tears a conversation down: emits every remaining entry as one batch
    /// with placeholders for whatever is unresolved, then closes the queue.
    ///
    /// Later messages for the conversation are rejected. Returns the number
    /// of entries emitted.
    pub fn force_flush(&mut self, chat_id: ChatId) -> usize {
        let queue = self
            .queues
            .entry(chat_id)
            .or_insert_with(|| DeliveryQueue::new(chat_id));
        let mut batch = queue.drain_all();
        for entry in &mut batch {
            entry.clear_pending();
        }
        tracing::debug!(chat_id = %chat_id, entries = batch.len(), "conversation force-flushed");
        self.emit_batch(chat_id, batch, true)
    }

    /// Releases entries whose download has outlived `long_download_after`.
    ///
    /// Only attachments under [`AttachmentPolicy::BlockWithTimeout`] are
    /// affected. Returns the number of entries emitted as a result.
    pub fn tick(&mut self, now: Instant) -> usize {
        let timeout = self.config.long_download_after;
        let mut chats = Vec::new();
        for (&chat_id, queue) in &mut self.queues {
            for entry in queue.iter_mut() {
                let expired = entry.pending().contains(DependencyKind::AttachmentFetch)
                    && entry
                        .attachment
                        .as_ref()
                        .is_some_and(|a| a.policy == AttachmentPolicy::BlockWithTimeout)
                    && now.saturating_duration_since(entry.enqueued_at) >= timeout;
                if expired {
                    tracing::debug!(chat_id = %chat_id, message_id = %entry.message.id, "long download, releasing message");
                    entry.resolve(DependencyKind::AttachmentFetch);
                    chats.push(chat_id);
                }
            }
        }
        chats.sort_unstable();
        chats.dedup();
        chats.into_iter().map(|chat_id| self.flush_ready(chat_id)).sum()
    }

    /// Cancels an unfinished download.
    ///
    /// The transfer becomes Failed, a `CancelDownload` request is issued, and
    /// entries waiting on it are released with the "content unavailable"
    /// marker. Returns `false` if no such download is in flight.
    pub fn cancel_transfer(&mut self, file_id: FileId) -> bool {
        let in_flight = self
            .transfers
            .get(file_id)
            .is_some_and(|t| !t.state().is_terminal());
        if !in_flight {
            tracing::debug!(file_id = %file_id, "nothing to cancel");
            return false;
        }
        let request_id = self.backend.send(BackendRequest::CancelDownload { file_id });
        self.resolver
            .register(request_id, PendingRequest::CancelDownload { file_id });
        let unblocked = self.transfers.fail(file_id, &mut self.frontend);
        self.release_attachments(unblocked);
        true
    }

    /// Tears the whole engine down.
    ///
    /// Force-flushes every conversation in id order, then cancels every
    /// unfinished download, which releases all temporary resources.
    pub fn shutdown(&mut self) {
        let mut chats: Vec<ChatId> = self.queues.keys().copied().collect();
        chats.sort_unstable();
        for chat_id in chats {
            self.force_flush(chat_id);
        }
        for file_id in self.transfers.in_flight() {
            self.cancel_transfer(file_id);
        }
        tracing::info!("delivery engine shut down");
    }

    fn emit_batch(&mut self, chat_id: ChatId, batch: Vec<Entry>, forced: bool) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let mut message_ids = Vec::with_capacity(batch.len());
        for entry in batch {
            message_ids.push(entry.message.id);
            self.emit_entry(entry, forced);
        }
        let count = message_ids.len();
        self.acknowledge(chat_id, message_ids);
        count
    }

    fn emit_entry(&mut self, entry: Entry, forced: bool) {
        let key = entry.key();
        let draft = self.draft(&entry);
        let tracked = entry
            .attachment
            .as_ref()
            .filter(|a| a.local_path.is_none())
            .map(|a| a.file_id);

        if let Some(file_id) = tracked
            && self.transfers.view(file_id) == AttachmentView::Downloading
        {
            if !forced {
                self.transfers
                    .watch(file_id, draft.clone(), &mut self.frontend);
            }
            if !draft.body.is_empty() {
                self.emit_message(&draft, AttachmentView::Downloading);
            }
            if let Some(text) = draft.downloading_notice() {
                self.frontend.emit(BridgeEvent::SystemNotice {
                    chat_id: draft.chat_id,
                    text,
                    timestamp: draft.timestamp,
                });
            }
        } else {
            let local = entry.attachment.as_ref().and_then(|a| a.local_path.clone());
            let content = match (local.as_deref(), tracked) {
                (Some(path), _) => draft.render(AttachmentView::Completed(path)),
                (None, Some(file_id)) => draft.render(self.transfers.view(file_id)),
                (None, None) => draft.render(AttachmentView::Unavailable),
            };
            self.frontend.emit(BridgeEvent::MessageReceived {
                chat_id: draft.chat_id,
                message_id: draft.message_id,
                sender: draft.sender,
                timestamp: draft.timestamp,
                content,
                outgoing: draft.outgoing,
            });
        }

        if let Some(file_id) = tracked {
            self.transfers.remove_referrer(file_id, key);
        }
    }

    fn emit_message(&mut self, draft: &MessageDraft, view: AttachmentView<'_>) {
        self.frontend.emit(BridgeEvent::MessageReceived {
            chat_id: draft.chat_id,
            message_id: draft.message_id,
            sender: draft.sender.clone(),
            timestamp: draft.timestamp,
            content: draft.render(view),
            outgoing: draft.outgoing,
        });
    }

    fn draft(&self, entry: &Entry) -> MessageDraft {
        let quote = match &entry.reply {
            ReplyState::NotReply => None,
            ReplyState::Resolved(target) => Some(Quote {
                author: self.display_name(target.sender_id),
                text: quoted_text(&target.content),
            }),
            ReplyState::Pending | ReplyState::Unavailable => Some(Quote::unavailable()),
        };
        MessageDraft {
            chat_id: entry.message.chat_id,
            message_id: entry.message.id,
            sender: self.display_name(entry.message.sender_id),
            timestamp: entry.message.date,
            outgoing: entry.message.is_outgoing,
            quote,
            body: entry.message.content.body().to_string(),
            attachment: entry.attachment.as_ref().map(|a| a.desc.clone()),
        }
    }
}
