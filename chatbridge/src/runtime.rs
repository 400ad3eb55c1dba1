//! Async runtime wiring for the delivery engine.
//!
//! The engine is synchronous; this module gives it a home in a single tokio
//! task so callers can feed it from async code. Inputs arrive on an
//! [`EngineInput`] channel and are applied one at a time; a
//! `tokio::time::interval` drives [`Engine::tick`].
//!
//! # Architecture
//!
//! ```text
//! caller ─── EngineInput ──▶ engine task ─── OutgoingRequest ──▶ backend connection
//!                                  └──────── BridgeEvent ─────▶ front end
//! ```

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use chatbridge_proto::backend::{BackendUpdate, OutgoingRequest};
use chatbridge_proto::message::{ChatId, FileId};

use crate::backend::ChannelBackend;
use crate::delivery::Engine;
use crate::delivery::policy::EngineConfig;
use crate::frontend::BridgeEvent;
use crate::transfer::ResourceStore;

/// Default capacity of the input channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default interval between timeout checks.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Errors from talking to the engine task.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The engine task has stopped and accepts no more input.
    #[error("engine task is no longer running")]
    Closed,

    /// The engine task panicked or was aborted.
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Inputs applied to the engine, in order.
#[derive(Debug)]
pub enum EngineInput {
    /// An update pushed by the backend (including responses).
    Update(BackendUpdate),
    /// Cancel an unfinished download.
    CancelTransfer(FileId),
    /// Tear a conversation down (forced flush).
    CloseConversation(ChatId),
    /// Tear the engine down and stop the task.
    Shutdown,
}

/// Tunables for the engine task.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of the input channel.
    pub channel_capacity: usize,
    /// How often [`Engine::tick`] runs.
    pub tick_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Handle to a running engine task.
#[derive(Debug)]
pub struct EngineHandle {
    input_tx: mpsc::Sender<EngineInput>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Queues one input for the engine.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Closed`] if the engine task has stopped.
    pub async fn send(&self, input: EngineInput) -> Result<(), RuntimeError> {
        self.input_tx
            .send(input)
            .await
            .map_err(|_| RuntimeError::Closed)
    }

    /// A sender for feeding the engine from other tasks.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<EngineInput> {
        self.input_tx.clone()
    }

    /// Tears the engine down and waits for the task to finish.
    ///
    /// Everything still queued is force-flushed and unfinished downloads are
    /// cancelled before the task exits.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Join`] if the task panicked.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        // The task may already have stopped; joining reports how it ended.
        if self.input_tx.send(EngineInput::Shutdown).await.is_err() {
            tracing::debug!("engine task already stopped before shutdown");
        }
        self.task.await?;
        Ok(())
    }
}

/// What the engine task produces.
#[derive(Debug)]
pub struct EngineOutputs {
    /// Requests for the backend connection to send.
    pub requests: mpsc::UnboundedReceiver<OutgoingRequest>,
    /// Events for the front end.
    pub events: mpsc::UnboundedReceiver<BridgeEvent>,
}

/// Spawn the engine task and return its handle and output channels.
///
/// Request ids in [`EngineOutputs::requests`] are allocated sequentially
/// from 1; responses fed back through [`EngineInput::Update`] must carry
/// them.
///
/// Must be called from within a tokio runtime.
pub fn spawn_engine<R>(
    engine_config: EngineConfig,
    resources: R,
    config: &RuntimeConfig,
) -> (EngineHandle, EngineOutputs)
where
    R: ResourceStore + Send + 'static,
{
    let (backend, requests) = ChannelBackend::new();
    let (event_tx, events) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::channel(config.channel_capacity);

    let engine = Engine::new(engine_config, backend, event_tx, resources);
    let tick_interval = config.tick_interval;
    let task = tokio::spawn(async move {
        engine_loop(engine, input_rx, tick_interval).await;
    });

    (
        EngineHandle { input_tx, task },
        EngineOutputs { requests, events },
    )
}

/// Background task: apply inputs one at a time and tick on an interval.
///
/// Exits after a [`EngineInput::Shutdown`], or when every input sender is
/// gone; both tear the engine down first.
async fn engine_loop<R: ResourceStore>(
    mut engine: Engine<ChannelBackend, mpsc::UnboundedSender<BridgeEvent>, R>,
    mut input_rx: mpsc::Receiver<EngineInput>,
    tick_interval: Duration,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            input = input_rx.recv() => match input {
                Some(EngineInput::Update(update)) => {
                    if let Err(e) = engine.on_update(update) {
                        tracing::warn!(error = %e, "update rejected");
                    }
                }
                Some(EngineInput::CancelTransfer(file_id)) => {
                    engine.cancel_transfer(file_id);
                }
                Some(EngineInput::CloseConversation(chat_id)) => {
                    engine.force_flush(chat_id);
                }
                Some(EngineInput::Shutdown) | None => {
                    engine.shutdown();
                    break;
                }
            },
            _ = ticker.tick() => {
                engine.tick(Instant::now());
            }
        }
    }
    tracing::info!("engine task stopped");
}
