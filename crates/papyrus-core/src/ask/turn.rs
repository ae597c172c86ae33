use std::fmt;

use papyrus_types::Source;

use crate::render;

/// Lifecycle of one question/answer exchange.
///
/// `Pending → StreamingAnswer → Complete | Failed`, or when the stream
/// cannot be opened, `Pending → FallbackRequesting → Complete | Failed`.
/// A stream that ends without a terminal event stays in `StreamingAnswer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Pending,
    StreamingAnswer,
    FallbackRequesting,
    Complete,
    Failed,
}

/// Snapshot of a turn. The consumer owns the live one; the display layer
/// only ever sees copies.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub question: String,
    /// Append-only while streaming.
    pub answer: String,
    /// Only filled by the fallback request.
    pub sources: Vec<Source>,
    pub retrieval_time_secs: f64,
    pub generation_time_secs: f64,
    /// Wall-clock seconds at the `timing` event (or fallback completion).
    pub total_time_secs: Option<f64>,
    /// Wall-clock seconds at completion, as persisted to history.
    pub response_time_secs: Option<f64>,
    /// Id of the history entry written for this turn.
    pub history_id: Option<i64>,
    pub error: Option<String>,
    pub state: TurnState,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: String::new(),
            sources: Vec::new(),
            retrieval_time_secs: 0.0,
            generation_time_secs: 0.0,
            total_time_secs: None,
            response_time_secs: None,
            history_id: None,
            error: None,
            state: TurnState::Pending,
        }
    }

    /// True when the stream ended without `done` or `error`.
    pub fn is_truncated(&self) -> bool {
        self.state == TurnState::StreamingAnswer
    }

    /// The answer rendered to HTML.
    pub fn html(&self) -> String {
        render::render(&self.answer)
    }

    pub fn timing_summary(&self) -> Option<TimingSummary> {
        self.total_time_secs.map(|total| TimingSummary {
            retrieval_secs: self.retrieval_time_secs,
            generation_secs: self.generation_time_secs,
            total_secs: total,
        })
    }
}

/// Retrieval / generation / total timings of a turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSummary {
    pub retrieval_secs: f64,
    pub generation_secs: f64,
    pub total_secs: f64,
}

impl fmt::Display for TimingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Retrieval: {:.2}s | Generation: {:.2}s | Total: {:.2}s",
            self.retrieval_secs, self.generation_secs, self.total_secs
        )
    }
}
