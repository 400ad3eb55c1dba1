//! Queue entries and their outstanding dependencies.

use std::time::Instant;

use chatbridge_proto::message::{ChatId, FileId, Message};

use super::policy::AttachmentPolicy;
use super::render::AttachmentDesc;

/// Locates an entry: its conversation and arrival sequence number.
pub type EntryKey = (ChatId, u64);

/// A kind of dependency an entry can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// The message this entry replies to is being fetched.
    ReplyFetch,
    /// The entry's attachment is being downloaded.
    AttachmentFetch,
}

/// The set of dependencies an entry is still waiting on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOps {
    reply_fetch: bool,
    attachment_fetch: bool,
}

impl PendingOps {
    /// Adds a dependency.
    pub const fn insert(&mut self, kind: DependencyKind) {
        match kind {
            DependencyKind::ReplyFetch => self.reply_fetch = true,
            DependencyKind::AttachmentFetch => self.attachment_fetch = true,
        }
    }

    /// Removes a dependency, returning whether it was present.
    pub const fn remove(&mut self, kind: DependencyKind) -> bool {
        let slot = match kind {
            DependencyKind::ReplyFetch => &mut self.reply_fetch,
            DependencyKind::AttachmentFetch => &mut self.attachment_fetch,
        };
        let was = *slot;
        *slot = false;
        was
    }

    /// Whether the given dependency is outstanding.
    #[must_use]
    pub const fn contains(&self, kind: DependencyKind) -> bool {
        match kind {
            DependencyKind::ReplyFetch => self.reply_fetch,
            DependencyKind::AttachmentFetch => self.attachment_fetch,
        }
    }

    /// Whether nothing is outstanding.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.reply_fetch && !self.attachment_fetch
    }

    /// Drops every outstanding dependency.
    pub const fn clear(&mut self) {
        self.reply_fetch = false;
        self.attachment_fetch = false;
    }
}

/// Resolution state of an entry's reply target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyState {
    /// The message is not a reply.
    NotReply,
    /// The target is being fetched.
    Pending,
    /// The target is known.
    Resolved(Box<Message>),
    /// The fetch failed; a placeholder is rendered.
    Unavailable,
}

/// The attachment an entry carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Backend file id.
    pub file_id: FileId,
    /// Label information.
    pub desc: AttachmentDesc,
    /// Expected size in bytes.
    pub size: u64,
    /// Local path when the file was already downloaded at ingestion.
    pub local_path: Option<String>,
    /// Whether the download may hold the entry back.
    pub policy: AttachmentPolicy,
}

/// One message awaiting ordered delivery.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Per-conversation arrival sequence number.
    pub seq: u64,
    /// The message as ingested.
    pub message: Message,
    /// Reply resolution.
    pub reply: ReplyState,
    /// Attachment, if any.
    pub attachment: Option<AttachmentRef>,
    /// When the entry was enqueued.
    pub enqueued_at: Instant,
    pending: PendingOps,
}

impl Entry {
    /// Creates an entry with no outstanding dependencies.
    #[must_use]
    pub fn new(seq: u64, message: Message, enqueued_at: Instant) -> Self {
        Self {
            seq,
            message,
            reply: ReplyState::NotReply,
            attachment: None,
            enqueued_at,
            pending: PendingOps::default(),
        }
    }

    /// The entry's key.
    #[must_use]
    pub const fn key(&self) -> EntryKey {
        (self.message.chat_id, self.seq)
    }

    /// Whether every dependency has resolved.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.pending.is_empty()
    }

    /// Outstanding dependencies.
    #[must_use]
    pub const fn pending(&self) -> PendingOps {
        self.pending
    }

    /// Marks a dependency as outstanding.
    pub const fn wait_on(&mut self, kind: DependencyKind) {
        self.pending.insert(kind);
    }

    /// Clears a dependency, returning whether it was outstanding.
    pub const fn resolve(&mut self, kind: DependencyKind) -> bool {
        self.pending.remove(kind)
    }

    /// Clears every dependency; used by forced flushes.
    pub const fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
