//! Ordered delivery engine.
//!
//! The [`Engine`] turns backend updates into conversation entries that reach
//! the front end in arrival order, fully formed, exactly once. Each incoming
//! message becomes an [`Entry`] in its conversation's [`DeliveryQueue`],
//! tagged with the dependencies (reply target, attachment) it still waits on.
//! Responses shrink those sets; whenever a queue's head becomes ready the
//! engine emits the ready prefix and acknowledges it with one request.
//!
//! The engine is a synchronous state machine: every input is handled to
//! completion by a `&mut self` call and nothing blocks. Waiting is queue state.

mod ack;
pub mod entry;
mod flush;
pub mod policy;
pub mod queue;
mod receive;
pub mod render;
pub mod resolver;

use std::collections::HashMap;
use std::time::Instant;

use chatbridge_proto::backend::BackendUpdate;
use chatbridge_proto::message::{ChatId, Message, MessageId, User, UserId};

use crate::backend::Backend;
use crate::frontend::FrontEnd;
use crate::transfer::{ResourceStore, TransferTracker};

use entry::{AttachmentRef, DependencyKind, Entry, ReplyState};
use policy::EngineConfig;
use queue::DeliveryQueue;
use render::AttachmentDesc;
use resolver::{AttachmentResolution, DependencyResolver};

/// Errors returned to the caller of ingestion.
///
/// Resolution and transfer failures never show up here; they are recovered
/// by placeholder rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The conversation was force-flushed and accepts no more messages.
    #[error("conversation {0} is closed")]
    ConversationClosed(ChatId),

    /// The message was already ingested in this conversation.
    #[error("message {message_id} already ingested in conversation {chat_id}")]
    DuplicateMessage {
        /// Conversation of the message.
        chat_id: ChatId,
        /// The repeated message id.
        message_id: MessageId,
    },
}

/// Orders backend messages into per-conversation emission batches.
///
/// Generic over the backend it issues requests to, the front end it emits
/// to, and the store backing in-flight downloads.
#[derive(Debug)]
pub struct Engine<B: Backend, F: FrontEnd, R: ResourceStore> {
    config: EngineConfig,
    backend: B,
    frontend: F,
    queues: HashMap<ChatId, DeliveryQueue>,
    resolver: DependencyResolver,
    transfers: TransferTracker<R>,
    users: HashMap<UserId, User>,
}

impl<B: Backend, F: FrontEnd, R: ResourceStore> Engine<B, F, R> {
    /// Creates an engine with no conversations.
    pub fn new(config: EngineConfig, backend: B, frontend: F, resources: R) -> Self {
        let resolver = DependencyResolver::new(config.message_cache_capacity);
        Self {
            config,
            backend,
            frontend,
            queues: HashMap::new(),
            resolver,
            transfers: TransferTracker::new(resources),
            users: HashMap::new(),
        }
    }

    /// Handles one update pushed by the backend.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if a new message cannot be ingested (see
    /// [`enqueue`](Self::enqueue)). Every other update is infallible.
    pub fn on_update(&mut self, update: BackendUpdate) -> Result<(), BridgeError> {
        match update {
            BackendUpdate::NewMessage { message } => self.enqueue(message).map(|_| ()),
            BackendUpdate::User { user } => {
                tracing::debug!(user_id = %user.id, name = %user.display_name(), "user updated");
                self.users.insert(user.id, user);
                Ok(())
            }
            BackendUpdate::File { file } => {
                self.on_file_update(&file);
                Ok(())
            }
            BackendUpdate::Response { request_id, result } => {
                self.on_response(request_id, result);
                Ok(())
            }
        }
    }

    /// Ingests a message: resolves its dependencies, appends it to its
    /// conversation's queue and flushes whatever became ready.
    ///
    /// Returns the entry's arrival sequence number.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ConversationClosed`] if the conversation was
    ///   force-flushed.
    /// - [`BridgeError::DuplicateMessage`] if the id was already ingested.
    pub fn enqueue(&mut self, message: Message) -> Result<u64, BridgeError> {
        let chat_id = message.chat_id;
        let queue = self
            .queues
            .entry(chat_id)
            .or_insert_with(|| DeliveryQueue::new(chat_id));
        if queue.is_closed() {
            tracing::warn!(chat_id = %chat_id, message_id = %message.id, "message for closed conversation rejected");
            return Err(BridgeError::ConversationClosed(chat_id));
        }
        if queue.has_seen(message.id) {
            tracing::warn!(chat_id = %chat_id, message_id = %message.id, "duplicate message rejected");
            return Err(BridgeError::DuplicateMessage {
                chat_id,
                message_id: message.id,
            });
        }
        let seq = queue.next_seq();

        let reply_target = message.reply_to_message_id;
        let attachment = message
            .content
            .file()
            .cloned()
            .zip(AttachmentDesc::of(&message.content));
        let policy = self.config.policy_for(&message.content);
        self.resolver.remember(message.clone());
        let mut entry = Entry::new(seq, message, Instant::now());

        if let Some(target) = reply_target {
            entry.reply = match self
                .resolver
                .resolve_reply(chat_id, target, seq, &mut self.backend)
            {
                Some(found) => ReplyState::Resolved(Box::new(found)),
                None => {
                    entry.wait_on(DependencyKind::ReplyFetch);
                    ReplyState::Pending
                }
            };
        }

        if let Some((file, desc)) = attachment {
            let mut attachment = AttachmentRef {
                file_id: file.id,
                desc,
                size: file.size,
                local_path: None,
                policy,
            };
            match self.resolver.resolve_attachment(
                &file,
                (chat_id, seq),
                &mut self.transfers,
                &mut self.backend,
            ) {
                AttachmentResolution::Local(path) => attachment.local_path = Some(path),
                AttachmentResolution::Transfer(state) => {
                    if policy.blocks() && !state.is_terminal() {
                        entry.wait_on(DependencyKind::AttachmentFetch);
                    }
                }
            }
            entry.attachment = Some(attachment);
        }

        tracing::debug!(
            chat_id = %chat_id,
            message_id = %entry.message.id,
            seq,
            ready = entry.is_ready(),
            "message enqueued"
        );
        if let Some(queue) = self.queues.get_mut(&chat_id) {
            queue.push(entry);
        }
        self.flush_ready(chat_id);
        Ok(seq)
    }

    /// The engine's configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The backend requests are issued to.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend.
    pub const fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The front end events are emitted to.
    pub const fn frontend(&self) -> &F {
        &self.frontend
    }

    /// Mutable access to the front end.
    pub const fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    /// The transfer tracker.
    pub const fn transfers(&self) -> &TransferTracker<R> {
        &self.transfers
    }

    /// Number of entries still queued in a conversation.
    #[must_use]
    pub fn queued_len(&self, chat_id: ChatId) -> usize {
        self.queues.get(&chat_id).map_or(0, DeliveryQueue::len)
    }

    /// Whether a conversation was torn down.
    #[must_use]
    pub fn is_closed(&self, chat_id: ChatId) -> bool {
        self.queues.get(&chat_id).is_some_and(DeliveryQueue::is_closed)
    }

    /// Number of backend requests still awaiting a response.
    #[must_use]
    pub fn outstanding_requests(&self) -> usize {
        self.resolver.outstanding()
    }

    /// Display name for a user, falling back to the numeric id.
    fn display_name(&self, user_id: UserId) -> String {
        self.users
            .get(&user_id)
            .map_or_else(|| format!("user {user_id}"), User::display_name)
    }
}
