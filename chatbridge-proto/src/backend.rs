//! Requests, responses, and updates exchanged with the chat backend.
//!
//! The backend is asynchronous: every request is tagged with a
//! [`RequestId`] and its [`BackendResponse`] arrives later, interleaved with
//! unsolicited [`BackendUpdate`]s.

use serde::{Deserialize, Serialize};

use crate::message::{ChatId, FileId, Message, MessageId, RemoteFile, User};

/// Download priority used for attachments the engine waits on.
pub const DOWNLOAD_PRIORITY: u8 = 1;

/// Identifies an outstanding backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a request identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request issued to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendRequest {
    /// Fetch one message by id (used to resolve reply targets).
    GetMessage {
        /// Conversation holding the message.
        chat_id: ChatId,
        /// The message to fetch.
        message_id: MessageId,
    },
    /// Start downloading a file. The response carries the final file state.
    DownloadFile {
        /// File to download.
        file_id: FileId,
        /// Download priority (1..=32).
        priority: u8,
    },
    /// Stop an in-progress download.
    CancelDownload {
        /// File whose download is cancelled.
        file_id: FileId,
    },
    /// Mark messages as read.
    ViewMessages {
        /// Conversation holding the messages.
        chat_id: ChatId,
        /// Messages being acknowledged, in emission order.
        message_ids: Vec<MessageId>,
        /// Whether to mark them read even if the chat is not open.
        force_read: bool,
    },
}

/// A request paired with the id its response will carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRequest {
    /// Identifier assigned at issuance.
    pub id: RequestId,
    /// The request itself.
    pub request: BackendRequest,
}

/// Error object returned by the backend in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("backend error {code}: {message}")]
pub struct BackendError {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

/// A successful response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendResponse {
    /// A message, in reply to [`BackendRequest::GetMessage`].
    Message(Message),
    /// A file state, in reply to [`BackendRequest::DownloadFile`].
    File(RemoteFile),
    /// Generic success with no payload.
    Ok,
}

/// Something the backend pushes to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendUpdate {
    /// A new message arrived in some conversation.
    NewMessage {
        /// The message.
        message: Message,
    },
    /// A user record was created or changed.
    User {
        /// The user.
        user: User,
    },
    /// A file's local state changed (download progress or completion).
    File {
        /// The file with its new local state.
        file: RemoteFile,
    },
    /// The response to an earlier request.
    Response {
        /// Id of the request being answered.
        request_id: RequestId,
        /// The payload or the backend's error.
        result: Result<BackendResponse, BackendError>,
    },
}
