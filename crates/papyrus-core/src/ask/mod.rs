//! Incremental answer-stream consumer.
//!
//! [`AnswerStreamConsumer::ask`] drives one turn: it opens the streaming
//! exchange, decodes frames as chunks arrive, applies events to the turn in
//! order, and escalates to a single non-streaming request when the stream
//! cannot be opened. Completed turns are written to the history log.
//!
//! Display layers observe progress through [`TurnUpdate`] messages instead
//! of being called into directly.

pub mod error;
pub mod transport;
mod turn;

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use papyrus_types::{QuerySettings, Source, StreamEvent, round2};
use tokio::sync::{Mutex, mpsc};

pub use self::error::{AskError, AskErrorKind, AskResult};
pub use self::transport::{ChunkStream, HttpTransport, QueryRequest, QueryResponse, QueryTransport};
pub use self::turn::{ConversationTurn, TimingSummary, TurnState};
use crate::history::{HistoryStore, NewEntry};
use crate::render;
use crate::stream::FrameDecoder;

/// History log shared between the consumer and the display layer.
pub type SharedHistory = Arc<Mutex<HistoryStore>>;

/// Message from the consumer to the display layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    State(TurnState),
    /// The accumulated answer and its rendering after a change.
    AnswerUpdated { answer: String, html: String },
    Timing(TimingSummary),
    /// A failure to show to the user.
    Error { message: String },
}

pub type UpdateTx = mpsc::Sender<TurnUpdate>;
pub type UpdateRx = mpsc::Receiver<TurnUpdate>;

/// Capacity of the update channel.
pub const DEFAULT_UPDATE_CHANNEL_CAPACITY: usize = 128;

pub fn create_update_channel() -> (UpdateTx, UpdateRx) {
    mpsc::channel(DEFAULT_UPDATE_CHANNEL_CAPACITY)
}

/// Update sender with a lossy mode for answer deltas and a reliable mode
/// for state changes and errors.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: UpdateTx,
}

impl UpdateSender {
    pub fn new(tx: UpdateTx) -> Self {
        Self { tx }
    }

    /// Never waits; dropped if the display layer is behind. Each delta
    /// carries the full answer, so a dropped one loses nothing.
    pub fn send_delta(&self, update: TurnUpdate) {
        let _ = self.tx.try_send(update);
    }

    pub async fn send_important(&self, update: TurnUpdate) {
        let _ = self.tx.send(update).await;
    }
}

/// Message used when the server reports an error without one.
const UNKNOWN_SERVER_ERROR: &str = "The server reported an error";

pub struct AnswerStreamConsumer<T> {
    transport: T,
    history: SharedHistory,
    updates: Option<UpdateSender>,
}

impl<T: QueryTransport> AnswerStreamConsumer<T> {
    pub fn new(transport: T, history: SharedHistory) -> Self {
        Self {
            transport,
            history,
            updates: None,
        }
    }

    /// Routes turn updates to `sender`.
    #[must_use]
    pub fn with_updates(mut self, sender: UpdateSender) -> Self {
        self.updates = Some(sender);
        self
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    /// Asks `query` and returns the turn in its final state.
    ///
    /// Never fails: transport and server failures end in
    /// [`TurnState::Failed`] with the message in [`ConversationTurn::error`].
    pub async fn ask(&self, query: &str, settings: &QuerySettings) -> ConversationTurn {
        let started = Instant::now();
        let mut turn = ConversationTurn::new(query);
        self.transition(&mut turn, TurnState::Pending).await;

        match self
            .transport
            .open_stream(&QueryRequest::streaming(query, settings))
            .await
        {
            Ok(stream) => {
                self.transition(&mut turn, TurnState::StreamingAnswer).await;
                self.consume_stream(stream, &mut turn, settings, started)
                    .await;
            }
            Err(err) => {
                tracing::warn!(error = %err, kind = %err.kind, "stream unavailable, falling back");
                self.transition(&mut turn, TurnState::FallbackRequesting)
                    .await;
                self.request_fallback(&mut turn, settings, started).await;
            }
        }

        turn
    }

    async fn consume_stream(
        &self,
        mut stream: ChunkStream,
        turn: &mut ConversationTurn,
        settings: &QuerySettings,
        started: Instant,
    ) {
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(error = %err, "answer stream read failed");
                    self.fail(turn, err.message).await;
                    return;
                }
            };
            let events = decoder.push(&bytes);
            tracing::debug!(
                bytes = bytes.len(),
                events = events.len(),
                "decoded chunk"
            );
            for event in events {
                let terminal = event.is_terminal();
                self.apply(event, turn, settings, started).await;
                if terminal {
                    return;
                }
            }
        }

        tracing::debug!(pending = decoder.pending_len(), "flushing stream tail");
        for event in decoder.finish() {
            let terminal = event.is_terminal();
            self.apply(event, turn, settings, started).await;
            if terminal {
                return;
            }
        }

        tracing::info!(
            answer_len = turn.answer.len(),
            discarded = decoder.discarded(),
            "answer stream ended without a terminal event"
        );
    }

    /// Applies one event to the turn.
    async fn apply(
        &self,
        event: StreamEvent,
        turn: &mut ConversationTurn,
        settings: &QuerySettings,
        started: Instant,
    ) {
        match event {
            StreamEvent::Metadata {
                retrieval_time_secs,
            } => {
                turn.retrieval_time_secs = retrieval_time_secs;
            }
            StreamEvent::AnswerDelta { content } => {
                turn.answer.push_str(&content);
                self.send_delta(TurnUpdate::AnswerUpdated {
                    answer: turn.answer.clone(),
                    html: render::render(&turn.answer),
                });
            }
            StreamEvent::Timing {
                generation_time_secs,
            } => {
                turn.generation_time_secs = generation_time_secs;
                turn.total_time_secs = Some(round2(started.elapsed().as_secs_f64()));
                if let Some(summary) = turn.timing_summary() {
                    self.send_delta(TurnUpdate::Timing(summary));
                }
            }
            StreamEvent::Done => {
                self.complete(turn, settings, Vec::new(), started).await;
            }
            StreamEvent::Error { message } => {
                let message = if message.trim().is_empty() {
                    UNKNOWN_SERVER_ERROR.to_string()
                } else {
                    message
                };
                self.fail(turn, message).await;
            }
        }
    }

    async fn request_fallback(
        &self,
        turn: &mut ConversationTurn,
        settings: &QuerySettings,
        started: Instant,
    ) {
        let request = QueryRequest::fallback(turn.question.clone(), settings);
        match self.transport.query(&request).await {
            Ok(response) => {
                turn.answer = response.answer;
                turn.retrieval_time_secs = response.retrieval_time;
                turn.generation_time_secs = response.generation_time;
                turn.total_time_secs = Some(round2(started.elapsed().as_secs_f64()));

                self.send_important(TurnUpdate::AnswerUpdated {
                    answer: turn.answer.clone(),
                    html: render::render(&turn.answer),
                })
                .await;
                if let Some(summary) = turn.timing_summary() {
                    self.send_important(TurnUpdate::Timing(summary)).await;
                }
                self.complete(turn, settings, response.sources, started)
                    .await;
            }
            Err(err) => {
                tracing::warn!(error = %err, kind = %err.kind, "fallback query failed");
                self.fail(turn, err.message).await;
            }
        }
    }

    async fn complete(
        &self,
        turn: &mut ConversationTurn,
        settings: &QuerySettings,
        sources: Vec<Source>,
        started: Instant,
    ) {
        let response_time = round2(started.elapsed().as_secs_f64());
        turn.response_time_secs = Some(response_time);
        turn.sources.clone_from(&sources);

        let new = NewEntry {
            query: turn.question.clone(),
            answer: turn.answer.clone(),
            sources,
            settings: settings.clone(),
            response_time_secs: response_time,
        };
        match self.history.lock().await.record(new) {
            Ok(entry) => turn.history_id = Some(entry.id),
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to save history"),
        }

        tracing::info!(
            response_time,
            answer_len = turn.answer.len(),
            "turn complete"
        );
        self.transition(turn, TurnState::Complete).await;
    }

    async fn fail(&self, turn: &mut ConversationTurn, message: String) {
        self.send_important(TurnUpdate::Error {
            message: message.clone(),
        })
        .await;
        turn.error = Some(message);
        self.transition(turn, TurnState::Failed).await;
    }

    async fn transition(&self, turn: &mut ConversationTurn, state: TurnState) {
        turn.state = state;
        self.send_important(TurnUpdate::State(state)).await;
    }

    fn send_delta(&self, update: TurnUpdate) {
        if let Some(updates) = &self.updates {
            updates.send_delta(update);
        }
    }

    async fn send_important(&self, update: TurnUpdate) {
        if let Some(updates) = &self.updates {
            updates.send_important(update).await;
        }
    }
}
