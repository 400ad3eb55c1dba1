//! Message, user, and file types as delivered by the chat backend.
//!
//! These mirror the backend's object model closely enough for the delivery
//! engine to discover dependencies (reply targets, attachments) without
//! knowing anything about the backend's wire encoding.

use serde::{Deserialize, Serialize};

/// Identifies a conversation (private chat, group, or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(i64);

impl ChatId {
    /// Creates a chat identifier from the backend's numeric id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the backend's numeric id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Creates a message identifier from the backend's numeric id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the backend's numeric id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a backend user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Creates a user identifier from the backend's numeric id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the backend's numeric id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a remote file known to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(i32);

impl FileId {
    /// Creates a file identifier from the backend's numeric id.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the backend's numeric id.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Second-precision UNIX timestamp, as the backend reports message dates.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from seconds since the UNIX epoch.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Returns the timestamp as seconds since the UNIX epoch.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// A backend user record, used for display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user's identifier.
    pub id: UserId,
    /// Given name.
    pub first_name: String,
    /// Family name (may be empty).
    #[serde(default)]
    pub last_name: String,
}

impl User {
    /// Returns `"first last"`, or just the first name when the last is empty.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

/// Local materialization state of a remote file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFile {
    /// Path of the local copy; empty until the backend starts writing it.
    pub path: String,
    /// Whether the backend is currently downloading this file.
    pub is_downloading_active: bool,
    /// Whether the local copy is complete.
    pub is_downloading_completed: bool,
    /// Bytes available locally so far.
    pub downloaded_size: u64,
}

/// A backend file descriptor with its current local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// The file's identifier.
    pub id: FileId,
    /// Exact size in bytes, or 0 when unknown.
    #[serde(default)]
    pub size: u64,
    /// Local materialization state.
    #[serde(default)]
    pub local: LocalFile,
}

impl RemoteFile {
    /// Returns the local path when the file is fully downloaded.
    #[must_use]
    pub fn completed_path(&self) -> Option<&str> {
        (self.local.is_downloading_completed && !self.local.path.is_empty())
            .then_some(self.local.path.as_str())
    }
}

/// A document (generic file) attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Original file name.
    pub file_name: String,
    /// MIME type as reported by the sender.
    pub mime_type: String,
    /// The file itself.
    pub file: RemoteFile,
}

/// One resolution of a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// The file holding this resolution.
    pub file: RemoteFile,
}

/// Content of a backend message.
///
/// A closed set: the delivery engine handles every variant explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text.
    Text {
        /// The text body.
        text: String,
    },
    /// A file attachment with an optional caption.
    Document {
        /// The attached document.
        document: Document,
        /// Caption text (may be empty).
        #[serde(default)]
        caption: String,
    },
    /// A photo in one or more resolutions with an optional caption.
    Photo {
        /// Available resolutions, smallest first.
        sizes: Vec<PhotoSize>,
        /// Caption text (may be empty).
        #[serde(default)]
        caption: String,
    },
}

impl MessageContent {
    /// Convenience constructor for text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text body or caption.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Document { caption, .. } | Self::Photo { caption, .. } => caption,
        }
    }

    /// Returns the file worth downloading for this content, if any.
    ///
    /// For photos this is the largest available resolution.
    #[must_use]
    pub fn file(&self) -> Option<&RemoteFile> {
        match self {
            Self::Text { .. } => None,
            Self::Document { document, .. } => Some(&document.file),
            Self::Photo { sizes, .. } => sizes
                .iter()
                .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
                .map(|size| &size.file),
        }
    }
}

/// A message as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The message identifier.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub chat_id: ChatId,
    /// Author of the message.
    pub sender_id: UserId,
    /// When the message was sent.
    pub date: Timestamp,
    /// Whether this message was sent by the local account.
    #[serde(default)]
    pub is_outgoing: bool,
    /// Message this one replies to, if any.
    #[serde(default)]
    pub reply_to_message_id: Option<MessageId>,
    /// The message content.
    pub content: MessageContent,
}
