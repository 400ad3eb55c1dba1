//! Dependency discovery and request bookkeeping.
//!
//! The [`DependencyResolver`] decides which backend requests an incoming
//! message needs, issues each at most once per target, and remembers what
//! every outstanding request id was for so its response can be routed back.

use std::collections::{HashMap, VecDeque};

use chatbridge_proto::backend::{BackendRequest, DOWNLOAD_PRIORITY, RequestId};
use chatbridge_proto::message::{ChatId, FileId, Message, MessageId, RemoteFile};

use crate::backend::Backend;
use crate::transfer::{ResourceStore, TransferState, TransferTracker};

use super::entry::EntryKey;

/// What an outstanding request id is waiting to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRequest {
    /// Fetch of a reply target, shared by every entry quoting it.
    ReplyFetch {
        /// Conversation of the target.
        chat_id: ChatId,
        /// The target message.
        message_id: MessageId,
        /// Sequence numbers of the waiting entries in `chat_id`.
        waiters: Vec<u64>,
    },
    /// Download of an attachment.
    Download {
        /// The file being downloaded.
        file_id: FileId,
    },
    /// Cancellation of a download.
    CancelDownload {
        /// The file whose download was cancelled.
        file_id: FileId,
    },
    /// Read acknowledgement for an emitted batch.
    Acknowledge {
        /// Conversation of the batch.
        chat_id: ChatId,
        /// Number of messages covered.
        count: usize,
    },
}

/// Outcome of resolving an entry's attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentResolution {
    /// The file is already available locally.
    Local(String),
    /// The entry reads a tracked transfer in this state.
    Transfer(TransferState),
}

/// Bounded FIFO cache of known messages, for local reply resolution.
#[derive(Debug)]
struct MessageCache {
    capacity: usize,
    messages: HashMap<(ChatId, MessageId), Message>,
    order: VecDeque<(ChatId, MessageId)>,
}

impl MessageCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }
        let key = (message.chat_id, message.id);
        if self.messages.insert(key, message).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.messages.remove(&evicted);
            }
        }
    }

    fn get(&self, chat_id: ChatId, message_id: MessageId) -> Option<&Message> {
        self.messages.get(&(chat_id, message_id))
    }
}

/// Discovers dependencies and routes responses back to them.
#[derive(Debug)]
pub struct DependencyResolver {
    cache: MessageCache,
    /// In-flight reply fetches by target, for sharing.
    reply_fetches: HashMap<(ChatId, MessageId), RequestId>,
    /// Every outstanding request the engine issued.
    requests: HashMap<RequestId, PendingRequest>,
}

impl DependencyResolver {
    /// Creates a resolver remembering up to `cache_capacity` messages.
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: MessageCache::new(cache_capacity),
            reply_fetches: HashMap::new(),
            requests: HashMap::new(),
        }
    }

    /// Remembers a message so later replies to it resolve locally.
    pub fn remember(&mut self, message: Message) {
        self.cache.insert(message);
    }

    /// Looks up a remembered message.
    #[must_use]
    pub fn cached(&self, chat_id: ChatId, message_id: MessageId) -> Option<&Message> {
        self.cache.get(chat_id, message_id)
    }

    /// Resolves a reply target for the entry `(chat_id, seq)`.
    ///
    /// Returns the target if it is cached. Otherwise the entry joins the
    /// in-flight fetch for that target, or a new fetch is issued, and `None`
    /// is returned.
    pub fn resolve_reply<B: Backend>(
        &mut self,
        chat_id: ChatId,
        target: MessageId,
        seq: u64,
        backend: &mut B,
    ) -> Option<Message> {
        if let Some(message) = self.cache.get(chat_id, target) {
            return Some(message.clone());
        }
        if let Some(request_id) = self.reply_fetches.get(&(chat_id, target))
            && let Some(PendingRequest::ReplyFetch { waiters, .. }) =
                self.requests.get_mut(request_id)
        {
            tracing::debug!(chat_id = %chat_id, target = %target, request_id = %request_id, "joining in-flight reply fetch");
            waiters.push(seq);
            return None;
        }

        let request_id = backend.send(BackendRequest::GetMessage {
            chat_id,
            message_id: target,
        });
        tracing::debug!(chat_id = %chat_id, target = %target, request_id = %request_id, "fetching reply target");
        self.reply_fetches.insert((chat_id, target), request_id);
        self.requests.insert(
            request_id,
            PendingRequest::ReplyFetch {
                chat_id,
                message_id: target,
                waiters: vec![seq],
            },
        );
        None
    }

    /// Resolves an attachment for the entry `key`.
    ///
    /// Files already downloaded need nothing. A live, non-failed transfer is
    /// shared. Otherwise exactly one download is started. The entry is
    /// registered as a referrer of whatever transfer it ends up reading.
    pub fn resolve_attachment<B: Backend, R: ResourceStore>(
        &mut self,
        file: &RemoteFile,
        key: EntryKey,
        transfers: &mut TransferTracker<R>,
        backend: &mut B,
    ) -> AttachmentResolution {
        if let Some(path) = file.completed_path() {
            return AttachmentResolution::Local(path.to_string());
        }
        let reusable = transfers.is_reusable(file.id);
        if !reusable && let Some(path) = transfers.materialized_path(file.id) {
            return AttachmentResolution::Local(path.to_string());
        }

        if !reusable && transfers.begin(file) == TransferState::Started {
            let request_id = backend.send(BackendRequest::DownloadFile {
                file_id: file.id,
                priority: DOWNLOAD_PRIORITY,
            });
            tracing::debug!(file_id = %file.id, request_id = %request_id, "downloading attachment");
            self.requests
                .insert(request_id, PendingRequest::Download { file_id: file.id });
            transfers.set_request(file.id, request_id);
        }
        transfers.add_referrer(file.id, key);
        let state = transfers
            .get(file.id)
            .map_or(TransferState::Failed, |t| t.state());
        AttachmentResolution::Transfer(state)
    }

    /// Records a request whose response needs no routing beyond logging.
    pub fn register(&mut self, request_id: RequestId, pending: PendingRequest) {
        self.requests.insert(request_id, pending);
    }

    /// Removes and returns what a request id was for.
    ///
    /// `None` means the id was never issued or was already answered.
    pub fn take(&mut self, request_id: RequestId) -> Option<PendingRequest> {
        let pending = self.requests.remove(&request_id)?;
        if let PendingRequest::ReplyFetch {
            chat_id,
            message_id,
            ..
        } = &pending
        {
            self.reply_fetches.remove(&(*chat_id, *message_id));
        }
        Some(pending)
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }
}
