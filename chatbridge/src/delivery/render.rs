//! Plain-text rendering of delivered messages and their substitutions.

use chatbridge_proto::message::{ChatId, MessageContent, MessageId, Timestamp};

/// Sender shown for a quoted message that could not be fetched.
pub const UNKNOWN_USER: &str = "Unknown user";

/// Quote text shown for a reply target that could not be fetched.
pub const MESSAGE_UNAVAILABLE: &str = "[message unavailable]";

/// Marker appended to an attachment whose download failed.
pub const CONTENT_UNAVAILABLE: &str = "[content unavailable]";

/// The quoted part of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Display name of the quoted message's author.
    pub author: String,
    /// Text of the quoted message.
    pub text: String,
}

impl Quote {
    /// Quote used when the reply target never resolved.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            author: UNKNOWN_USER.to_string(),
            text: MESSAGE_UNAVAILABLE.to_string(),
        }
    }
}

/// What kind of file an attachment is, for labels and notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentDesc {
    /// A named document.
    Document {
        /// File name.
        file_name: String,
        /// MIME type.
        mime_type: String,
    },
    /// A photo.
    Photo,
}

impl AttachmentDesc {
    /// Describes the attachment carried by `content`, if any.
    #[must_use]
    pub fn of(content: &MessageContent) -> Option<Self> {
        match content {
            MessageContent::Text { .. } => None,
            MessageContent::Document { document, .. } => Some(Self::Document {
                file_name: document.file_name.clone(),
                mime_type: document.mime_type.clone(),
            }),
            MessageContent::Photo { .. } => Some(Self::Photo),
        }
    }

    /// Short human-readable label, e.g. `report.pdf [application/pdf]`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Document {
                file_name,
                mime_type,
            } => format!("{file_name} [{mime_type}]"),
            Self::Photo => "photo".to_string(),
        }
    }
}

/// Download outcome as seen at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentView<'a> {
    /// The file is available at this local path.
    Completed(&'a str),
    /// The download failed or was cancelled.
    Unavailable,
    /// The download is still running.
    Downloading,
}

/// Everything needed to render one message, captured at emission time.
///
/// Messages released before their download finished keep their draft so the
/// final content can be rendered when the transfer completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// Conversation the message belongs to.
    pub chat_id: ChatId,
    /// The message's id.
    pub message_id: MessageId,
    /// Display name of the author.
    pub sender: String,
    /// Message date.
    pub timestamp: Timestamp,
    /// Whether the local account sent it.
    pub outgoing: bool,
    /// Reply quote, if the message is a reply.
    pub quote: Option<Quote>,
    /// Text body or caption.
    pub body: String,
    /// Attachment descriptor, if any.
    pub attachment: Option<AttachmentDesc>,
}

impl MessageDraft {
    /// Renders the message content for the given attachment outcome.
    ///
    /// `view` is ignored for messages without an attachment. While the
    /// download is running only the quote and caption are rendered.
    #[must_use]
    pub fn render(&self, view: AttachmentView<'_>) -> String {
        let main = match (&self.attachment, view) {
            (None, _) | (Some(_), AttachmentView::Downloading) => self.body.clone(),
            (Some(desc), AttachmentView::Completed(path)) => {
                with_caption(format!("{}: file://{path}", desc.label()), &self.body)
            }
            (Some(desc), AttachmentView::Unavailable) => {
                with_caption(format!("{}: {CONTENT_UNAVAILABLE}", desc.label()), &self.body)
            }
        };
        match &self.quote {
            Some(quote) => format!("> {} wrote:\n> {}\n{main}", quote.author, quote.text),
            None => main,
        }
    }

    /// System notice shown while the attachment is still downloading.
    #[must_use]
    pub fn downloading_notice(&self) -> Option<String> {
        self.attachment
            .as_ref()
            .map(|desc| format!("{}: Downloading {}", self.sender, desc.label()))
    }
}

/// Text used when a message is quoted by a reply.
#[must_use]
pub fn quoted_text(content: &MessageContent) -> String {
    let body = content.body();
    if !body.is_empty() {
        return body.to_string();
    }
    AttachmentDesc::of(content).map_or_else(String::new, |desc| format!("[{}]", desc.label()))
}

fn with_caption(head: String, caption: &str) -> String {
    if caption.is_empty() {
        head
    } else {
        format!("{head}\n{caption}")
    }
}
