//! Integration tests for ordered delivery through the public engine API.
//!
//! Each test drives an [`Engine`] with a recording backend and front end and
//! checks what the user sees and what the backend is asked, in order:
//!
//! 1. Replies wait for their quoted message; later messages wait behind them.
//! 2. Teardown emits everything with placeholders and acknowledges it once.
//! 3. Long downloads are released with a notice and rewritten on completion.
//! 4. Downloads hold back exactly the messages queued behind them.
//! 5. Temporary resources are released exactly once.

use std::time::{Duration, Instant};

use chatbridge::backend::RequestLog;
use chatbridge::delivery::policy::{AttachmentPolicy, EngineConfig};
use chatbridge::delivery::{BridgeError, Engine};
use chatbridge::frontend::BridgeEvent;
use chatbridge::transfer::{InMemoryResources, TransferState};

use chatbridge_proto::backend::{
    BackendError, BackendRequest, BackendResponse, BackendUpdate, OutgoingRequest, RequestId,
};
use chatbridge_proto::message::{
    ChatId, Document, FileId, LocalFile, Message, MessageContent, MessageId, PhotoSize, RemoteFile,
    Timestamp, User, UserId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CHAT: ChatId = ChatId::new(100);
const USER: UserId = UserId::new(1);
const NAME: &str = "Ada Lovelace";

type TestEngine = Engine<RequestLog, Vec<BridgeEvent>, InMemoryResources>;

/// Engine with one known user, plus a handle on its resource ledger.
fn logged_in(config: EngineConfig) -> (TestEngine, InMemoryResources) {
    let resources = InMemoryResources::new();
    let mut engine = Engine::new(config, RequestLog::new(), Vec::new(), resources.clone());
    engine
        .on_update(BackendUpdate::User {
            user: User {
                id: USER,
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
            },
        })
        .unwrap();
    (engine, resources)
}

fn message(id: i64, content: MessageContent) -> Message {
    Message {
        id: MessageId::new(id),
        chat_id: CHAT,
        sender_id: USER,
        date: Timestamp::from_secs(10_000 + id),
        is_outgoing: false,
        reply_to_message_id: None,
        content,
    }
}

fn text(id: i64, body: &str) -> Message {
    message(id, MessageContent::text(body))
}

fn reply(id: i64, to: i64, content: MessageContent) -> Message {
    Message {
        reply_to_message_id: Some(MessageId::new(to)),
        ..message(id, content)
    }
}

fn remote(file: i32) -> RemoteFile {
    RemoteFile {
        id: FileId::new(file),
        size: 10_000,
        local: LocalFile::default(),
    }
}

fn downloaded(file: i32, path: &str) -> RemoteFile {
    RemoteFile {
        id: FileId::new(file),
        size: 10_000,
        local: LocalFile {
            path: path.into(),
            is_downloading_active: false,
            is_downloading_completed: true,
            downloaded_size: 10_000,
        },
    }
}

fn document(file: i32, name: &str, caption: &str) -> MessageContent {
    MessageContent::Document {
        document: Document {
            file_name: name.into(),
            mime_type: "mime/type".into(),
            file: remote(file),
        },
        caption: caption.into(),
    }
}

fn photo(file: i32, caption: &str) -> MessageContent {
    MessageContent::Photo {
        sizes: vec![PhotoSize {
            width: 640,
            height: 480,
            file: remote(file),
        }],
        caption: caption.into(),
    }
}

fn respond(engine: &mut TestEngine, id: RequestId, result: Result<BackendResponse, BackendError>) {
    engine
        .on_update(BackendUpdate::Response {
            request_id: id,
            result,
        })
        .unwrap();
}

fn not_found() -> BackendError {
    BackendError {
        code: 404,
        message: "Not Found".into(),
    }
}

/// Takes the recorded requests, dropping their ids.
fn requests(engine: &mut TestEngine) -> Vec<BackendRequest> {
    engine
        .backend_mut()
        .take()
        .into_iter()
        .map(|r| r.request)
        .collect()
}

/// Takes the recorded requests with their ids.
fn outgoing(engine: &mut TestEngine) -> Vec<OutgoingRequest> {
    engine.backend_mut().take()
}

fn events(engine: &mut TestEngine) -> Vec<BridgeEvent> {
    std::mem::take(engine.frontend_mut())
}

fn view(ids: &[i64]) -> BackendRequest {
    BackendRequest::ViewMessages {
        chat_id: CHAT,
        message_ids: ids.iter().copied().map(MessageId::new).collect(),
        force_read: true,
    }
}

fn received(id: i64, content: &str) -> BridgeEvent {
    BridgeEvent::MessageReceived {
        chat_id: CHAT,
        message_id: MessageId::new(id),
        sender: NAME.into(),
        timestamp: Timestamp::from_secs(10_000 + id),
        content: content.into(),
        outgoing: false,
    }
}

fn notice(id: i64, text: &str) -> BridgeEvent {
    BridgeEvent::SystemNotice {
        chat_id: CHAT,
        text: text.into(),
        timestamp: Timestamp::from_secs(10_000 + id),
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

#[test]
fn reply_and_follow_up_emit_together_once_target_arrives() {
    let (mut engine, _) = logged_in(EngineConfig::default());

    engine.enqueue(reply(2, 1, MessageContent::text("reply"))).unwrap();
    let sent = outgoing(&mut engine);
    assert_eq!(
        sent.iter().map(|r| r.request.clone()).collect::<Vec<_>>(),
        vec![BackendRequest::GetMessage {
            chat_id: CHAT,
            message_id: MessageId::new(1),
        }]
    );
    assert!(engine.frontend().is_empty());

    engine.enqueue(text(3, "followUp")).unwrap();
    assert!(engine.frontend().is_empty());
    assert!(engine.backend().sent().is_empty());

    respond(
        &mut engine,
        sent[0].id,
        Ok(BackendResponse::Message(text(1, "original"))),
    );
    assert_eq!(
        events(&mut engine),
        vec![
            received(2, "> Ada Lovelace wrote:\n> original\nreply"),
            received(3, "followUp"),
        ]
    );
    assert_eq!(requests(&mut engine), vec![view(&[2, 3])]);
}

#[test]
fn teardown_renders_unresolved_reply_as_unavailable() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(reply(2, 1, MessageContent::text("reply"))).unwrap();
    engine.enqueue(text(3, "followUp")).unwrap();
    requests(&mut engine);

    assert_eq!(engine.force_flush(CHAT), 2);
    assert_eq!(
        events(&mut engine),
        vec![
            received(2, "> Unknown user wrote:\n> [message unavailable]\nreply"),
            received(3, "followUp"),
        ]
    );
    assert_eq!(requests(&mut engine), vec![view(&[2, 3])]);
}

#[test]
fn failed_reply_fetch_uses_placeholder_quote() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(reply(2, 1, MessageContent::text("reply"))).unwrap();
    let fetch = outgoing(&mut engine)[0].id;

    respond(&mut engine, fetch, Err(not_found()));
    assert_eq!(
        events(&mut engine),
        vec![received(
            2,
            "> Unknown user wrote:\n> [message unavailable]\nreply"
        )]
    );
}

#[test]
fn reply_to_ingested_message_is_resolved_locally() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(text(1, "original")).unwrap();
    engine.enqueue(reply(2, 1, MessageContent::text("reply"))).unwrap();

    // Two acknowledgements and no fetch.
    assert_eq!(requests(&mut engine), vec![view(&[1]), view(&[2])]);
    assert_eq!(
        events(&mut engine),
        vec![
            received(1, "original"),
            received(2, "> Ada Lovelace wrote:\n> original\nreply"),
        ]
    );
}

#[test]
fn duplicate_response_is_ignored() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(reply(2, 1, MessageContent::text("reply"))).unwrap();
    let fetch = outgoing(&mut engine)[0].id;

    respond(
        &mut engine,
        fetch,
        Ok(BackendResponse::Message(text(1, "original"))),
    );
    assert_eq!(events(&mut engine).len(), 1);
    requests(&mut engine);

    respond(
        &mut engine,
        fetch,
        Ok(BackendResponse::Message(text(1, "changed"))),
    );
    assert!(engine.frontend().is_empty());
    assert!(engine.backend().sent().is_empty());
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[test]
fn pending_photo_is_flushed_with_notice_at_teardown() {
    let (mut engine, resources) = logged_in(EngineConfig::default());
    engine.enqueue(message(1, photo(1234, "photo"))).unwrap();
    assert_eq!(
        requests(&mut engine),
        vec![BackendRequest::DownloadFile {
            file_id: FileId::new(1234),
            priority: 1,
        }]
    );
    assert!(engine.frontend().is_empty());

    engine.force_flush(CHAT);
    assert_eq!(
        events(&mut engine),
        vec![
            received(1, "photo"),
            notice(1, "Ada Lovelace: Downloading photo"),
        ]
    );
    assert_eq!(requests(&mut engine), vec![view(&[1])]);

    // The download itself only stops at shutdown.
    assert_eq!(resources.live_count(), 1);
    engine.shutdown();
    assert_eq!(
        requests(&mut engine),
        vec![BackendRequest::CancelDownload {
            file_id: FileId::new(1234),
        }]
    );
    assert_eq!(resources.live_count(), 0);
}

fn long_download_in_reply(caption: &str) {
    let (mut engine, resources) = logged_in(EngineConfig::default());
    engine
        .enqueue(reply(2, 1, document(1234, "doc.file.name", caption)))
        .unwrap();
    let sent = outgoing(&mut engine);
    assert_eq!(
        sent.iter().map(|r| r.request.clone()).collect::<Vec<_>>(),
        vec![
            BackendRequest::GetMessage {
                chat_id: CHAT,
                message_id: MessageId::new(1),
            },
            BackendRequest::DownloadFile {
                file_id: FileId::new(1234),
                priority: 1,
            },
        ]
    );
    let (fetch, download) = (sent[0].id, sent[1].id);

    respond(
        &mut engine,
        fetch,
        Ok(BackendResponse::Message(text(1, "1<2"))),
    );
    assert!(engine.frontend().is_empty(), "still waiting on the download");

    assert_eq!(engine.tick(Instant::now() + Duration::from_secs(3)), 1);
    let released = events(&mut engine);
    let handle = match &released[0] {
        BridgeEvent::TransferStarted {
            handle,
            message_id,
            file_name,
            total_bytes,
            ..
        } => {
            assert_eq!(*message_id, MessageId::new(2));
            assert_eq!(file_name, "doc.file.name [mime/type]");
            assert_eq!(*total_bytes, 10_000);
            *handle
        }
        other => panic!("expected TransferStarted, got {other:?}"),
    };
    let mut expected = vec![released[0].clone()];
    if !caption.is_empty() {
        expected.push(received(
            2,
            &format!("> Ada Lovelace wrote:\n> 1<2\n{caption}"),
        ));
    }
    expected.push(notice(
        2,
        "Ada Lovelace: Downloading doc.file.name [mime/type]",
    ));
    assert_eq!(released, expected);
    assert_eq!(requests(&mut engine), vec![view(&[2])]);

    engine
        .on_update(BackendUpdate::File {
            file: RemoteFile {
                id: FileId::new(1234),
                size: 10_000,
                local: LocalFile {
                    path: "/path".into(),
                    is_downloading_active: true,
                    is_downloading_completed: false,
                    downloaded_size: 2_000,
                },
            },
        })
        .unwrap();
    assert_eq!(
        events(&mut engine),
        vec![BridgeEvent::TransferProgress {
            handle,
            message_id: MessageId::new(2),
            bytes_transferred: 2_000,
            total_bytes: 10_000,
        }]
    );

    respond(
        &mut engine,
        download,
        Ok(BackendResponse::File(downloaded(1234, "/path"))),
    );
    let mut final_content = "> Ada Lovelace wrote:\n> 1<2\ndoc.file.name [mime/type]: file:///path".to_string();
    if !caption.is_empty() {
        final_content = format!("{final_content}\n{caption}");
    }
    assert_eq!(
        events(&mut engine),
        vec![
            BridgeEvent::TransferCompleted {
                handle,
                message_id: MessageId::new(2),
                path: "/path".into(),
                total_bytes: 10_000,
            },
            BridgeEvent::MessageUpdated {
                chat_id: CHAT,
                message_id: MessageId::new(2),
                sender: NAME.into(),
                timestamp: Timestamp::from_secs(10_002),
                content: final_content,
            },
        ]
    );
    assert!(engine.backend().sent().is_empty(), "no second acknowledgement");
    assert_eq!(resources.live_count(), 0);
    assert_eq!(resources.released(), vec![handle]);
}

#[test]
fn long_download_in_reply_with_caption() {
    long_download_in_reply("caption");
}

#[test]
fn long_download_in_reply_without_caption() {
    long_download_in_reply("");
}

#[test]
fn downloads_hold_back_only_what_is_queued_behind_them() {
    let (mut engine, _) = logged_in(EngineConfig::default());

    engine
        .enqueue(message(1, document(1234, "doc1.file.name", "document1")))
        .unwrap();
    let first = outgoing(&mut engine)[0].id;
    engine.enqueue(text(2, "followUp")).unwrap();
    engine
        .enqueue(message(3, document(1235, "doc2.file.name", "document2")))
        .unwrap();
    let second = outgoing(&mut engine)[0].id;
    assert!(engine.frontend().is_empty());

    respond(
        &mut engine,
        first,
        Ok(BackendResponse::File(downloaded(1234, "/path1"))),
    );
    assert_eq!(
        events(&mut engine),
        vec![
            received(1, "doc1.file.name [mime/type]: file:///path1\ndocument1"),
            received(2, "followUp"),
        ]
    );
    // Message 3 is still queued, so it is not acknowledged yet.
    assert_eq!(requests(&mut engine), vec![view(&[1, 2])]);

    // The answer carries the other file's id; the request id decides.
    respond(
        &mut engine,
        second,
        Ok(BackendResponse::File(downloaded(1234, "/path2"))),
    );
    assert_eq!(
        events(&mut engine),
        vec![received(
            3,
            "doc2.file.name [mime/type]: file:///path2\ndocument2"
        )]
    );
    assert_eq!(requests(&mut engine), vec![view(&[3])]);
}

#[test]
fn file_already_downloaded_needs_no_request() {
    let (mut engine, resources) = logged_in(EngineConfig::default());
    let content = MessageContent::Document {
        document: Document {
            file_name: "notes.txt".into(),
            mime_type: "text/plain".into(),
            file: downloaded(7, "/cache/notes.txt"),
        },
        caption: String::new(),
    };
    engine.enqueue(message(1, content)).unwrap();

    assert_eq!(requests(&mut engine), vec![view(&[1])]);
    assert_eq!(
        events(&mut engine),
        vec![received(1, "notes.txt [text/plain]: file:///cache/notes.txt")]
    );
    assert!(resources.allocated().is_empty());
}

#[test]
fn shared_file_is_downloaded_once_for_two_conversations() {
    let (mut engine, resources) = logged_in(EngineConfig::default());
    let other = ChatId::new(200);

    engine.enqueue(message(1, photo(55, ""))).unwrap();
    engine
        .enqueue(Message {
            chat_id: other,
            ..message(9, photo(55, "again"))
        })
        .unwrap();
    let sent = outgoing(&mut engine);
    assert_eq!(sent.len(), 1, "one download for both messages");
    assert_eq!(resources.allocated().len(), 1);

    respond(
        &mut engine,
        sent[0].id,
        Ok(BackendResponse::File(downloaded(55, "/p"))),
    );
    let shown = events(&mut engine);
    assert_eq!(shown.len(), 2);
    assert!(shown.contains(&received(1, "photo: file:///p")));
    assert!(shown.contains(&BridgeEvent::MessageReceived {
        chat_id: other,
        message_id: MessageId::new(9),
        sender: NAME.into(),
        timestamp: Timestamp::from_secs(10_009),
        content: "photo: file:///p\nagain".into(),
        outgoing: false,
    }));
    // One acknowledgement per conversation, in conversation id order.
    assert_eq!(
        requests(&mut engine),
        vec![
            view(&[1]),
            BackendRequest::ViewMessages {
                chat_id: other,
                message_ids: vec![MessageId::new(9)],
                force_read: true,
            },
        ]
    );
    assert_eq!(resources.live_count(), 0);
    assert_eq!(resources.released().len(), 1);
}

#[test]
fn failed_download_renders_unavailable_and_releases_followers() {
    let (mut engine, resources) = logged_in(EngineConfig::default());
    engine
        .enqueue(message(1, document(3, "a.bin", "see attached")))
        .unwrap();
    let download = outgoing(&mut engine)[0].id;
    engine.enqueue(text(2, "next")).unwrap();

    respond(&mut engine, download, Err(not_found()));
    assert_eq!(
        events(&mut engine),
        vec![
            received(1, "a.bin [mime/type]: [content unavailable]\nsee attached"),
            received(2, "next"),
        ]
    );
    assert_eq!(requests(&mut engine), vec![view(&[1, 2])]);
    assert_eq!(resources.live_count(), 0);
}

#[test]
fn download_answer_is_applied_to_the_requested_file() {
    let (mut engine, resources) = logged_in(EngineConfig {
        document_policy: AttachmentPolicy::Block,
        ..EngineConfig::default()
    });
    engine
        .enqueue(message(1, document(77, "report.pdf", "")))
        .unwrap();
    let download = outgoing(&mut engine)[0].id;
    engine.enqueue(text(2, "after")).unwrap();

    respond(
        &mut engine,
        download,
        Ok(BackendResponse::File(downloaded(78, "/files/report.pdf"))),
    );
    assert_eq!(
        events(&mut engine),
        vec![
            received(1, "report.pdf [mime/type]: file:///files/report.pdf"),
            received(2, "after"),
        ]
    );
    assert_eq!(engine.queued_len(CHAT), 0);
    assert!(engine.transfers().get(FileId::new(77)).is_none());
    assert_eq!(resources.live_count(), 0);
}

#[test]
fn backend_stopping_a_download_before_any_bytes_fails_it() {
    let (mut engine, resources) = logged_in(EngineConfig {
        document_policy: AttachmentPolicy::Block,
        ..EngineConfig::default()
    });
    engine.enqueue(message(1, document(12, "a.bin", ""))).unwrap();
    engine.enqueue(text(2, "after")).unwrap();
    requests(&mut engine);

    engine
        .on_update(BackendUpdate::File { file: remote(12) })
        .unwrap();
    assert_eq!(
        events(&mut engine),
        vec![
            received(1, "a.bin [mime/type]: [content unavailable]"),
            received(2, "after"),
        ]
    );
    assert_eq!(requests(&mut engine), vec![view(&[1, 2])]);
    assert_eq!(engine.queued_len(CHAT), 0);
    assert_eq!(resources.live_count(), 0);
}

#[test]
fn backend_stopping_a_running_download_fails_it() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(message(1, photo(8, ""))).unwrap();
    requests(&mut engine);

    let mut progress = remote(8);
    progress.local.is_downloading_active = true;
    progress.local.downloaded_size = 1_000;
    engine.on_update(BackendUpdate::File { file: progress }).unwrap();
    assert_eq!(
        engine.transfers().get(FileId::new(8)).map(|t| t.state()),
        Some(TransferState::Progressing)
    );

    let mut stopped = remote(8);
    stopped.local.downloaded_size = 1_000;
    engine.on_update(BackendUpdate::File { file: stopped }).unwrap();
    assert_eq!(
        events(&mut engine),
        vec![received(1, "photo: [content unavailable]")]
    );
}

#[test]
fn completion_by_file_update_makes_later_response_harmless() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(message(1, photo(8, ""))).unwrap();
    let download = outgoing(&mut engine)[0].id;

    engine
        .on_update(BackendUpdate::File {
            file: downloaded(8, "/p8"),
        })
        .unwrap();
    assert_eq!(events(&mut engine), vec![received(1, "photo: file:///p8")]);
    requests(&mut engine);

    respond(
        &mut engine,
        download,
        Ok(BackendResponse::File(downloaded(8, "/p8"))),
    );
    assert!(engine.frontend().is_empty());
    assert!(engine.backend().sent().is_empty());
}

#[test]
fn refused_allocation_renders_unavailable_without_download() {
    let (mut engine, resources) = logged_in(EngineConfig::default());
    resources.refuse_allocations();

    engine.enqueue(message(1, photo(4, "pic"))).unwrap();
    assert_eq!(requests(&mut engine), vec![view(&[1])]);
    assert_eq!(
        events(&mut engine),
        vec![received(1, "photo: [content unavailable]\npic")]
    );
    assert!(engine.transfers().is_empty());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancelling_a_queued_download_releases_its_message() {
    let (mut engine, resources) = logged_in(EngineConfig {
        document_policy: AttachmentPolicy::Block,
        ..EngineConfig::default()
    });
    engine.enqueue(message(1, document(6, "big.iso", ""))).unwrap();
    engine.enqueue(text(2, "after")).unwrap();
    requests(&mut engine);

    assert!(engine.cancel_transfer(FileId::new(6)));
    assert_eq!(
        requests(&mut engine),
        vec![
            BackendRequest::CancelDownload {
                file_id: FileId::new(6),
            },
            view(&[1, 2]),
        ]
    );
    assert_eq!(
        events(&mut engine),
        vec![
            received(1, "big.iso [mime/type]: [content unavailable]"),
            received(2, "after"),
        ]
    );
    assert_eq!(resources.live_count(), 0);
}

#[test]
fn cancelling_a_visible_download_reports_failure() {
    let (mut engine, _) = logged_in(EngineConfig {
        document_policy: AttachmentPolicy::EmitImmediately,
        ..EngineConfig::default()
    });
    engine.enqueue(message(1, document(6, "big.iso", ""))).unwrap();
    let handle = match events(&mut engine).first() {
        Some(BridgeEvent::TransferStarted { handle, .. }) => *handle,
        other => panic!("expected TransferStarted, got {other:?}"),
    };

    assert!(engine.cancel_transfer(FileId::new(6)));
    assert_eq!(
        events(&mut engine),
        vec![BridgeEvent::TransferFailed {
            handle,
            message_id: MessageId::new(1),
        }]
    );
    assert!(!engine.cancel_transfer(FileId::new(6)), "already finished");
}

// ---------------------------------------------------------------------------
// Conversations and protocol errors
// ---------------------------------------------------------------------------

#[test]
fn conversations_are_independent() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    let other = ChatId::new(200);

    engine.enqueue(reply(2, 1, MessageContent::text("reply"))).unwrap();
    engine
        .enqueue(Message {
            chat_id: other,
            ..text(5, "elsewhere")
        })
        .unwrap();

    assert_eq!(engine.queued_len(CHAT), 1);
    assert_eq!(engine.queued_len(other), 0);
    assert!(matches!(
        events(&mut engine).as_slice(),
        [BridgeEvent::MessageReceived { chat_id, content, .. }]
            if *chat_id == other && content == "elsewhere"
    ));
}

#[test]
fn response_to_unknown_request_changes_nothing() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(reply(2, 1, MessageContent::text("reply"))).unwrap();
    requests(&mut engine);

    respond(
        &mut engine,
        RequestId::new(999),
        Ok(BackendResponse::Message(text(1, "original"))),
    );
    assert!(engine.frontend().is_empty());
    assert!(engine.backend().sent().is_empty());
    assert_eq!(engine.queued_len(CHAT), 1);
    assert_eq!(engine.outstanding_requests(), 1);
}

#[test]
fn closed_conversation_rejects_new_messages() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.force_flush(CHAT);
    assert!(engine.is_closed(CHAT));

    assert_eq!(
        engine.enqueue(text(1, "late")),
        Err(BridgeError::ConversationClosed(CHAT))
    );
    assert_eq!(
        engine.on_update(BackendUpdate::NewMessage {
            message: text(2, "late"),
        }),
        Err(BridgeError::ConversationClosed(CHAT))
    );
    assert!(engine.frontend().is_empty());
}

#[test]
fn duplicate_message_is_rejected() {
    let (mut engine, _) = logged_in(EngineConfig::default());
    engine.enqueue(text(1, "once")).unwrap();
    assert_eq!(
        engine.enqueue(text(1, "twice")),
        Err(BridgeError::DuplicateMessage {
            chat_id: CHAT,
            message_id: MessageId::new(1),
        })
    );
    assert_eq!(events(&mut engine).len(), 1);
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[test]
fn every_resource_is_released_exactly_once() {
    let (mut engine, resources) = logged_in(EngineConfig::default());

    engine.enqueue(message(1, photo(1, ""))).unwrap();
    engine.enqueue(message(2, photo(2, ""))).unwrap();
    engine.enqueue(message(3, photo(3, ""))).unwrap();
    let downloads: Vec<RequestId> = outgoing(&mut engine).iter().map(|r| r.id).collect();
    assert_eq!(resources.live_count(), 3);

    respond(
        &mut engine,
        downloads[0],
        Ok(BackendResponse::File(downloaded(1, "/1"))),
    );
    respond(&mut engine, downloads[1], Err(not_found()));
    engine.shutdown();
    engine.shutdown();

    let mut allocated = resources.allocated();
    let mut released = resources.released();
    allocated.sort_unstable();
    released.sort_unstable();
    assert_eq!(allocated, released);
    assert_eq!(resources.live_count(), 0);
    assert!(engine.transfers().is_empty());
}
