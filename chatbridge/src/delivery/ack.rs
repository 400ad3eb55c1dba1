//! Read acknowledgements for emitted batches.
//!
//! Every emission batch is acknowledged with exactly one `ViewMessages`
//! request covering exactly the batch's message ids.

use chatbridge_proto::backend::{BackendError, BackendRequest, BackendResponse};
use chatbridge_proto::message::{ChatId, MessageId};

use crate::backend::Backend;
use crate::frontend::FrontEnd;
use crate::transfer::ResourceStore;

use super::Engine;
use super::resolver::PendingRequest;

impl<B: Backend, F: FrontEnd, R: ResourceStore> Engine<B, F, R> {
    /// Issues the acknowledgement for one emitted batch.
    pub(super) fn acknowledge(&mut self, chat_id: ChatId, message_ids: Vec<MessageId>) {
        let count = message_ids.len();
        let request_id = self.backend.send(BackendRequest::ViewMessages {
            chat_id,
            message_ids,
            force_read: true,
        });
        self.resolver
            .register(request_id, PendingRequest::Acknowledge { chat_id, count });
        tracing::debug!(chat_id = %chat_id, count, request_id = %request_id, "batch acknowledged");
    }
}

/// Logs the backend's answer to an acknowledgement.
///
/// A refused acknowledgement is not retried: the messages were already shown
/// and the backend reports them unread again on reconnect.
pub(super) fn on_acknowledged(
    chat_id: ChatId,
    count: usize,
    result: &Result<BackendResponse, BackendError>,
) {
    match result {
        Ok(_) => tracing::trace!(chat_id = %chat_id, count, "acknowledgement confirmed"),
        Err(e) => tracing::warn!(chat_id = %chat_id, count, error = %e, "acknowledgement refused"),
    }
}
