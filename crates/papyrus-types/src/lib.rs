//! Shared data model for the papyrus client crates.
//!
//! Field names follow the backend's JSON contract (snake case), which is
//! also the format of the persisted history log.

use serde::{Deserialize, Serialize};

/// Retrieval and generation parameters sent with every query.
///
/// `bm25_weight + vector_weight == 1.0` is the caller's responsibility;
/// use [`QuerySettings::balanced`] to derive one weight from the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySettings {
    pub top_k: u32,
    pub bm25_weight: f64,
    pub vector_weight: f64,
    pub prompt_template: String,
}

impl QuerySettings {
    pub const DEFAULT_TOP_K: u32 = 5;
    pub const DEFAULT_BM25_WEIGHT: f64 = 0.4;
    pub const DEFAULT_PROMPT_TEMPLATE: &str = "default";

    /// Prompt templates the backend knows about. Unknown names fall back to
    /// `default` server-side.
    pub const PROMPT_TEMPLATES: &[&str] = &[
        "default",
        "academic",
        "detailed",
        "comparative",
        "authors",
        "summary",
    ];

    /// Builds settings with the vector weight auto-balanced against BM25.
    ///
    /// Both weights are rounded to two decimals, the precision the weight
    /// slider works in.
    pub fn balanced(top_k: u32, bm25_weight: f64, prompt_template: impl Into<String>) -> Self {
        let bm25 = round2(bm25_weight.clamp(0.0, 1.0));
        Self {
            top_k,
            bm25_weight: bm25,
            vector_weight: round2(1.0 - bm25),
            prompt_template: prompt_template.into(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::balanced(
            Self::DEFAULT_TOP_K,
            Self::DEFAULT_BM25_WEIGHT,
            Self::DEFAULT_PROMPT_TEMPLATE,
        )
    }
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A retrieved chunk backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
    pub score: f64,
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_type: Option<String>,
}

/// Typed events decoded from the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Retrieval finished on the server.
    Metadata { retrieval_time_secs: f64 },
    /// Next fragment of the answer text.
    AnswerDelta { content: String },
    /// Generation finished on the server.
    Timing { generation_time_secs: f64 },
    /// Stream completed successfully.
    Done,
    /// Server reported a failure mid-stream.
    Error { message: String },
}

impl StreamEvent {
    /// Returns true for the two kinds that end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

/// One persisted question/answer exchange.
///
/// Immutable once created, except for `favorite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Creation time in epoch millis, unique within the log.
    pub id: i64,
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Creation time in epoch millis (equal to `id` for entries created here).
    #[serde(default)]
    pub timestamp: i64,
    pub settings: QuerySettings,
    #[serde(rename = "response_time")]
    pub response_time_secs: f64,
    #[serde(default)]
    pub favorite: bool,
}

impl HistoryEntry {
    const PREVIEW_CHARS: usize = 150;

    /// Returns the first 150 characters of the answer.
    pub fn preview(&self) -> &str {
        match self.answer.char_indices().nth(Self::PREVIEW_CHARS) {
            Some((idx, _)) => &self.answer[..idx],
            None => &self.answer,
        }
    }

    /// Creation time in epoch millis. Entries written without a timestamp
    /// fall back to their id, which is also a creation time.
    pub fn created_at_millis(&self) -> i64 {
        if self.timestamp > 0 {
            self.timestamp
        } else {
            self.id
        }
    }

    /// Case-insensitive substring match against the query or the answer.
    pub fn matches(&self, needle_lowercase: &str) -> bool {
        self.query.to_lowercase().contains(needle_lowercase)
            || self.answer.to_lowercase().contains(needle_lowercase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_settings_sum_to_one() {
        let settings = QuerySettings::balanced(5, 0.37, "academic");
        assert!((settings.bm25_weight - 0.37).abs() < f64::EPSILON);
        assert!((settings.vector_weight - 0.63).abs() < 1e-9);
        assert!((settings.bm25_weight + settings.vector_weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_balanced_settings_clamps_weight() {
        let settings = QuerySettings::balanced(3, 1.7, "default");
        assert!((settings.bm25_weight - 1.0).abs() < f64::EPSILON);
        assert!(settings.vector_weight.abs() < f64::EPSILON);
    }

    #[test]
    fn test_history_entry_uses_wire_field_names() {
        let entry = HistoryEntry {
            id: 1,
            query: "q".to_string(),
            answer: "a".to_string(),
            sources: Vec::new(),
            timestamp: 1,
            settings: QuerySettings::default(),
            response_time_secs: 1.25,
            favorite: false,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""response_time":1.25"#));
        assert!(json.contains(r#""top_k":5"#));
        assert!(json.contains(r#""prompt_template":"default""#));
    }

    #[test]
    fn test_history_entry_missing_optional_fields_default() {
        let json = r#"{"id":7,"query":"q","answer":"a","settings":{"top_k":3,"bm25_weight":0.5,"vector_weight":0.5,"prompt_template":"summary"},"response_time":0.5}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert!(entry.sources.is_empty());
        assert!(!entry.favorite);
        assert_eq!(entry.timestamp, 0);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let entry = HistoryEntry {
            id: 1,
            query: String::new(),
            answer: "é".repeat(200),
            sources: Vec::new(),
            timestamp: 1,
            settings: QuerySettings::default(),
            response_time_secs: 0.0,
            favorite: false,
        };
        assert_eq!(entry.preview().chars().count(), 150);
    }

    #[test]
    fn test_stream_event_terminal_kinds() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(
            StreamEvent::Error {
                message: "x".to_string()
            }
            .is_terminal()
        );
        assert!(
            !StreamEvent::AnswerDelta {
                content: "x".to_string()
            }
            .is_terminal()
        );
    }
}
