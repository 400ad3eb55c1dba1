//! Front-end boundary: what the engine shows the user.
//!
//! The engine reports everything as [`BridgeEvent`]s through the
//! [`FrontEnd`] trait. A `Vec<BridgeEvent>` records events (tests, replay);
//! an unbounded channel sender forwards them to a display task.

use serde::Serialize;
use tokio::sync::mpsc;

use chatbridge_proto::message::{ChatId, MessageId, Timestamp};

use crate::transfer::TransferHandle;

/// Events emitted to the conversation front end and its transfer sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A message appears in the conversation.
    MessageReceived {
        /// Conversation.
        chat_id: ChatId,
        /// The message id.
        message_id: MessageId,
        /// Display name of the author.
        sender: String,
        /// Message date.
        timestamp: Timestamp,
        /// Rendered content.
        content: String,
        /// Whether the local account sent it.
        outgoing: bool,
    },
    /// An already shown message is rewritten with its final content.
    MessageUpdated {
        /// Conversation.
        chat_id: ChatId,
        /// The message id.
        message_id: MessageId,
        /// Display name of the author.
        sender: String,
        /// Message date.
        timestamp: Timestamp,
        /// New rendered content.
        content: String,
    },
    /// A system line in the conversation (e.g. "Downloading …").
    SystemNotice {
        /// Conversation.
        chat_id: ChatId,
        /// Notice text.
        text: String,
        /// Date of the message the notice refers to.
        timestamp: Timestamp,
    },
    /// A download became visible to the user.
    TransferStarted {
        /// Local handle of the download.
        handle: TransferHandle,
        /// Conversation of the message the download belongs to.
        chat_id: ChatId,
        /// Message the download belongs to.
        message_id: MessageId,
        /// Label of the file being downloaded.
        file_name: String,
        /// Expected size in bytes.
        total_bytes: u64,
    },
    /// Download progress.
    TransferProgress {
        /// Local handle of the download.
        handle: TransferHandle,
        /// Message the download belongs to.
        message_id: MessageId,
        /// Bytes received so far.
        bytes_transferred: u64,
        /// Expected size in bytes.
        total_bytes: u64,
    },
    /// The download finished.
    TransferCompleted {
        /// Local handle of the download.
        handle: TransferHandle,
        /// Message the download belongs to.
        message_id: MessageId,
        /// Where the file now lives.
        path: String,
        /// Final size in bytes.
        total_bytes: u64,
    },
    /// The download failed or was cancelled.
    TransferFailed {
        /// Local handle of the download.
        handle: TransferHandle,
        /// Message the download belongs to.
        message_id: MessageId,
    },
}

/// Receives everything the engine shows to the user.
pub trait FrontEnd {
    /// Deliver one event.
    fn emit(&mut self, event: BridgeEvent);
}

impl FrontEnd for Vec<BridgeEvent> {
    fn emit(&mut self, event: BridgeEvent) {
        self.push(event);
    }
}

impl FrontEnd for mpsc::UnboundedSender<BridgeEvent> {
    fn emit(&mut self, event: BridgeEvent) {
        if self.send(event).is_err() {
            tracing::debug!("front end dropped, event discarded");
        }
    }
}
