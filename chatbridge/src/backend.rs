//! Request side of the backend boundary.
//!
//! Defines the [`Backend`] trait the engine issues requests through.
//! Implementations:
//! - [`RequestLog`]: records requests in memory (tests, replay inspection)
//! - [`ChannelBackend`]: forwards requests to a connection task over a channel

use tokio::sync::mpsc;

use chatbridge_proto::backend::{BackendRequest, OutgoingRequest, RequestId};

/// Issues requests to the chat backend.
///
/// Issuing never blocks: the response arrives later as a
/// `BackendUpdate::Response` carrying the returned [`RequestId`].
pub trait Backend {
    /// Hand a request to the backend and return the id its response will carry.
    fn send(&mut self, request: BackendRequest) -> RequestId;
}

/// Hands out request ids sequentially, starting at 1.
#[derive(Debug, Clone, Default)]
struct RequestIds {
    last: u64,
}

impl RequestIds {
    const fn next(&mut self) -> RequestId {
        self.last += 1;
        RequestId::new(self.last)
    }
}

/// In-memory backend that records every request it is given.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    ids: RequestIds,
    sent: Vec<OutgoingRequest>,
}

impl RequestLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests recorded since the last [`take`](Self::take).
    #[must_use]
    pub fn sent(&self) -> &[OutgoingRequest] {
        &self.sent
    }

    /// Removes and returns the recorded requests.
    pub fn take(&mut self) -> Vec<OutgoingRequest> {
        std::mem::take(&mut self.sent)
    }
}

impl Backend for RequestLog {
    fn send(&mut self, request: BackendRequest) -> RequestId {
        let id = self.ids.next();
        self.sent.push(OutgoingRequest { id, request });
        id
    }
}

/// Backend that forwards requests to a connection task.
///
/// If the receiving side is gone the request is dropped with a warning; its
/// dependents are resolved by the eventual forced flush.
#[derive(Debug)]
pub struct ChannelBackend {
    ids: RequestIds,
    tx: mpsc::UnboundedSender<OutgoingRequest>,
}

impl ChannelBackend {
    /// Creates a backend and the receiver the connection task reads from.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                ids: RequestIds::default(),
                tx,
            },
            rx,
        )
    }
}

impl Backend for ChannelBackend {
    fn send(&mut self, request: BackendRequest) -> RequestId {
        let id = self.ids.next();
        if self.tx.send(OutgoingRequest { id, request }).is_err() {
            tracing::warn!(request_id = %id, "backend connection gone, request dropped");
        }
        id
    }
}
