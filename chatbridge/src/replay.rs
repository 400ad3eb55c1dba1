//! Session scripts and output formatting for the replay binary.
//!
//! A script is JSON lines. Each line is either a backend update, exactly as
//! the backend would push it, or a control step:
//!
//! ```text
//! {"type":"new_message","message":{...}}
//! {"type":"response","request_id":1,"result":{"Ok":{"type":"message",...}}}
//! {"type":"wait","millis":2500}
//! {"type":"close_conversation","chat_id":1}
//! {"type":"cancel_transfer","file_id":7}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Responses refer to
//! request ids, which the engine allocates sequentially from 1.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;

use chatbridge_proto::backend::{BackendRequest, BackendUpdate, OutgoingRequest};
use chatbridge_proto::message::{ChatId, FileId, Timestamp};

use crate::config::OutputFormat;
use crate::frontend::BridgeEvent;
use crate::runtime::EngineInput;

/// Format used when the configured one is invalid.
const FALLBACK_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from reading a session script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("failed to read script {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A line is neither a backend update nor a control step.
    #[error("line {line}: {source}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Control steps a script can contain besides backend updates.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Control {
    CloseConversation { chat_id: ChatId },
    CancelTransfer { file_id: FileId },
    Wait { millis: u64 },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptLine {
    Control(Control),
    Update(BackendUpdate),
}

/// One step of a parsed script.
#[derive(Debug)]
pub enum ScriptStep {
    /// Feed this input to the engine.
    Input(EngineInput),
    /// Let time pass, so timeouts can fire.
    Wait(Duration),
}

/// Parses a JSON-lines session script.
///
/// # Errors
///
/// Returns [`ScriptError::Parse`] for the first line that is not valid.
pub fn parse_script(source: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = serde_json::from_str(line).map_err(|source| ScriptError::Parse {
            line: index + 1,
            source,
        })?;
        steps.push(match parsed {
            ScriptLine::Update(update) => ScriptStep::Input(EngineInput::Update(update)),
            ScriptLine::Control(Control::CloseConversation { chat_id }) => {
                ScriptStep::Input(EngineInput::CloseConversation(chat_id))
            }
            ScriptLine::Control(Control::CancelTransfer { file_id }) => {
                ScriptStep::Input(EngineInput::CancelTransfer(file_id))
            }
            ScriptLine::Control(Control::Wait { millis }) => {
                ScriptStep::Wait(Duration::from_millis(millis))
            }
        });
    }
    Ok(steps)
}

/// Reads and parses a script file.
///
/// # Errors
///
/// Returns [`ScriptError`] if the file cannot be read or parsed.
pub fn load_script(path: &std::path::Path) -> Result<Vec<ScriptStep>, ScriptError> {
    let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&source)
}

/// Renders engine output as lines of text or JSON.
#[derive(Debug, Clone)]
pub struct Printer {
    format: OutputFormat,
    timestamp_format: String,
}

impl Printer {
    /// Creates a printer. An invalid timestamp format is replaced by the
    /// default one.
    #[must_use]
    pub fn new(format: OutputFormat, timestamp_format: &str) -> Self {
        let valid = !StrftimeItems::new(timestamp_format).any(|item| matches!(item, Item::Error));
        let timestamp_format = if valid {
            timestamp_format.to_string()
        } else {
            tracing::warn!(format = timestamp_format, "invalid timestamp format, using default");
            FALLBACK_TIMESTAMP_FORMAT.to_string()
        };
        Self {
            format,
            timestamp_format,
        }
    }

    /// One line describing a front-end event.
    #[must_use]
    pub fn event(&self, event: &BridgeEvent) -> String {
        if self.format == OutputFormat::Json {
            return to_json(event);
        }
        match event {
            BridgeEvent::MessageReceived {
                chat_id,
                sender,
                timestamp,
                content,
                outgoing,
                ..
            } => {
                let arrow = if *outgoing { "->" } else { "<-" };
                format!(
                    "[{}] chat {chat_id} {arrow} {sender}: {}",
                    self.timestamp(*timestamp),
                    indent(content)
                )
            }
            BridgeEvent::MessageUpdated {
                chat_id,
                message_id,
                sender,
                timestamp,
                content,
            } => format!(
                "[{}] chat {chat_id} ~ {sender} (message {message_id} updated): {}",
                self.timestamp(*timestamp),
                indent(content)
            ),
            BridgeEvent::SystemNotice {
                chat_id,
                text,
                timestamp,
            } => format!("[{}] chat {chat_id} * {text}", self.timestamp(*timestamp)),
            BridgeEvent::TransferStarted {
                handle,
                message_id,
                file_name,
                total_bytes,
                ..
            } => format!(
                "transfer {handle} started: {file_name} ({total_bytes} bytes, message {message_id})"
            ),
            BridgeEvent::TransferProgress {
                handle,
                bytes_transferred,
                total_bytes,
                ..
            } => format!("transfer {handle}: {bytes_transferred}/{total_bytes} bytes"),
            BridgeEvent::TransferCompleted { handle, path, .. } => {
                format!("transfer {handle} completed: {path}")
            }
            BridgeEvent::TransferFailed { handle, .. } => format!("transfer {handle} failed"),
        }
    }

    /// One line describing a backend request.
    #[must_use]
    pub fn request(&self, request: &OutgoingRequest) -> String {
        if self.format == OutputFormat::Json {
            return to_json(request);
        }
        let id = request.id;
        match &request.request {
            BackendRequest::GetMessage {
                chat_id,
                message_id,
            } => format!("request {id}: get message {message_id} in chat {chat_id}"),
            BackendRequest::DownloadFile { file_id, priority } => {
                format!("request {id}: download file {file_id} (priority {priority})")
            }
            BackendRequest::CancelDownload { file_id } => {
                format!("request {id}: cancel download of file {file_id}")
            }
            BackendRequest::ViewMessages {
                chat_id,
                message_ids,
                ..
            } => {
                let mut ids = String::new();
                for (i, message_id) in message_ids.iter().enumerate() {
                    if i > 0 {
                        ids.push_str(", ");
                    }
                    let _ = write!(ids, "{message_id}");
                }
                format!("request {id}: mark read in chat {chat_id}: {ids}")
            }
        }
    }

    fn timestamp(&self, timestamp: Timestamp) -> String {
        chrono::DateTime::from_timestamp(timestamp.as_secs(), 0).map_or_else(
            || timestamp.to_string(),
            |dt| dt.format(&self.timestamp_format).to_string(),
        )
    }
}

fn indent(content: &str) -> String {
    content.replace('\n', "\n    ")
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}
