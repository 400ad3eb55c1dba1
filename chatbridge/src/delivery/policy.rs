//! Tunables that decide when an entry is considered ready.

use std::time::Duration;

use serde::Deserialize;

use chatbridge_proto::message::MessageContent;

/// Whether an attachment download holds its message back in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentPolicy {
    /// The message waits until the download completes or fails.
    Block,
    /// The message waits, but [`Engine::tick`](super::Engine::tick) releases it
    /// once the download has been pending longer than
    /// [`EngineConfig::long_download_after`]. The released message shows a
    /// "Downloading" notice and is rewritten when the download finishes.
    #[default]
    BlockWithTimeout,
    /// The attachment never blocks; the message is released like a long
    /// download as soon as its other dependencies resolve.
    EmitImmediately,
}

impl AttachmentPolicy {
    /// Whether a message under this policy starts out waiting on its download.
    #[must_use]
    pub const fn blocks(self) -> bool {
        matches!(self, Self::Block | Self::BlockWithTimeout)
    }
}

/// Configuration for the delivery engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Policy for photo attachments.
    pub photo_policy: AttachmentPolicy,
    /// Policy for document attachments.
    pub document_policy: AttachmentPolicy,
    /// How long a [`AttachmentPolicy::BlockWithTimeout`] download may hold
    /// its message back.
    pub long_download_after: Duration,
    /// Number of messages remembered for local reply resolution.
    pub message_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            photo_policy: AttachmentPolicy::BlockWithTimeout,
            document_policy: AttachmentPolicy::BlockWithTimeout,
            long_download_after: Duration::from_secs(2),
            message_cache_capacity: 1_000,
        }
    }
}

impl EngineConfig {
    /// The policy governing the attachment carried by `content`.
    #[must_use]
    pub const fn policy_for(&self, content: &MessageContent) -> AttachmentPolicy {
        match content {
            MessageContent::Photo { .. } => self.photo_policy,
            MessageContent::Document { .. } => self.document_policy,
            MessageContent::Text { .. } => AttachmentPolicy::EmitImmediately,
        }
    }
}
