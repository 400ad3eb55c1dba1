//! Per-conversation delivery queue.
//!
//! Entries leave the queue only as a contiguous ready prefix starting at the
//! head, or all at once when the conversation is torn down. A head entry that
//! is still waiting holds back everything behind it.

use std::collections::{HashSet, VecDeque};

use chatbridge_proto::message::{ChatId, MessageId};

use super::entry::Entry;

/// Ordered entries of one conversation.
#[derive(Debug)]
pub struct DeliveryQueue {
    chat_id: ChatId,
    entries: VecDeque<Entry>,
    next_seq: u64,
    /// Ids of every message ever enqueued, for duplicate detection.
    seen: HashSet<MessageId>,
    closed: bool,
}

impl DeliveryQueue {
    /// Creates an empty queue for a conversation.
    #[must_use]
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            entries: VecDeque::new(),
            next_seq: 0,
            seen: HashSet::new(),
            closed: false,
        }
    }

    /// The conversation this queue belongs to.
    #[must_use]
    pub const fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Sequence number the next enqueued entry will receive.
    #[must_use]
    pub const fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Whether a message with this id was already enqueued.
    #[must_use]
    pub fn has_seen(&self, id: MessageId) -> bool {
        self.seen.contains(&id)
    }

    /// Appends an entry at the tail.
    ///
    /// The entry must carry [`next_seq`](Self::next_seq); the counter advances.
    pub fn push(&mut self, entry: Entry) {
        debug_assert_eq!(entry.seq, self.next_seq, "entry sequence out of order");
        self.next_seq = entry.seq + 1;
        self.seen.insert(entry.message.id);
        self.entries.push_back(entry);
    }

    /// Looks up a queued entry by sequence number.
    pub fn get_mut(&mut self, seq: u64) -> Option<&mut Entry> {
        let index = self
            .entries
            .binary_search_by_key(&seq, |entry| entry.seq)
            .ok()?;
        self.entries.get_mut(index)
    }

    /// Iterates queued entries in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Iterates queued entries mutably in arrival order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    /// Removes and returns the longest ready prefix.
    ///
    /// Stops at the first entry that is still waiting on a dependency.
    pub fn take_ready_prefix(&mut self) -> Vec<Entry> {
        let mut batch = Vec::new();
        while self.entries.front().is_some_and(Entry::is_ready) {
            if let Some(entry) = self.entries.pop_front() {
                batch.push(entry);
            }
        }
        batch
    }

    /// Removes every entry regardless of readiness and closes the queue.
    pub fn drain_all(&mut self) -> Vec<Entry> {
        self.closed = true;
        self.entries.drain(..).collect()
    }

    /// Whether the queue was torn down.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
