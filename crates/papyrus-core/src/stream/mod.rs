//! Decoder for the line-oriented answer stream.
//!
//! The server pushes lines of the form `data: {"type": ..., ...}`. Chunk
//! boundaries are arbitrary, so a line may arrive in pieces; bytes after the
//! last newline are held back until the rest of the line shows up.
//!
//! Lines without the `data: ` prefix are ignored. Lines with the prefix whose
//! payload does not parse are malformed frames: they are counted and
//! discarded, never surfaced and never fatal to the stream.

use papyrus_types::StreamEvent;
use serde::Deserialize;

/// Literal prefix of every meaningful line.
pub const FRAME_PREFIX: &str = "data: ";

/// Result of decoding a buffer.
#[derive(Debug, Default, PartialEq)]
pub struct Decoded<'a> {
    /// Events in arrival order.
    pub events: Vec<StreamEvent>,
    /// Bytes after the last newline, not yet a complete line.
    pub remainder: &'a [u8],
    /// Number of `data: ` lines that failed to parse.
    pub discarded: usize,
}

/// Outcome of classifying one complete line.
#[derive(Debug, PartialEq)]
pub enum Frame {
    /// A well-formed event.
    Event(StreamEvent),
    /// Not a frame (no `data: ` prefix, blank line, comment...).
    Ignored,
    /// A frame whose payload is not a known event.
    Malformed,
}

/// Decodes every complete line in `buffer`.
///
/// Pure: the caller keeps [`Decoded::remainder`] and prepends it to the next
/// chunk. See [`FrameDecoder`] for a stateful wrapper.
pub fn decode(buffer: &[u8]) -> Decoded<'_> {
    let mut decoded = Decoded::default();
    let mut rest = buffer;

    while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
        let (line, tail) = rest.split_at(newline);
        push_frame(&mut decoded, line);
        rest = &tail[1..];
    }

    decoded.remainder = rest;
    decoded
}

fn push_frame(decoded: &mut Decoded<'_>, line: &[u8]) {
    match parse_frame(&String::from_utf8_lossy(line)) {
        Frame::Event(event) => decoded.events.push(event),
        Frame::Malformed => decoded.discarded += 1,
        Frame::Ignored => {}
    }
}

/// Classifies one complete line (without its newline).
pub fn parse_frame(line: &str) -> Frame {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
        return Frame::Ignored;
    };
    match serde_json::from_str::<WireEvent>(payload) {
        Ok(wire) => Frame::Event(wire.into()),
        Err(err) => {
            tracing::trace!(error = %err, "discarding malformed frame");
            Frame::Malformed
        }
    }
}

/// Stateful line reassembly over [`decode`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    discarded: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.pending.extend_from_slice(chunk);
        let decoded = decode(&self.pending);
        let consumed = self.pending.len() - decoded.remainder.len();
        let events = decoded.events;
        self.discarded += decoded.discarded;
        self.pending.drain(..consumed);
        events
    }

    /// Flushes a final line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.pending);
        let mut decoded = Decoded::default();
        push_frame(&mut decoded, &line);
        self.discarded += decoded.discarded;
        decoded.events
    }

    /// Total malformed frames seen so far.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Bytes buffered waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// === Wire format ===

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Metadata {
        #[serde(default)]
        retrieval_time: f64,
    },
    Answer {
        content: String,
    },
    Timing {
        #[serde(default)]
        generation_time: f64,
    },
    Done,
    Error {
        #[serde(default)]
        message: String,
    },
}

impl From<WireEvent> for StreamEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::Metadata { retrieval_time } => StreamEvent::Metadata {
                retrieval_time_secs: retrieval_time,
            },
            WireEvent::Answer { content } => StreamEvent::AnswerDelta { content },
            WireEvent::Timing { generation_time } => StreamEvent::Timing {
                generation_time_secs: generation_time,
            },
            WireEvent::Done => StreamEvent::Done,
            WireEvent::Error { message } => StreamEvent::Error { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(content: &str) -> StreamEvent {
        StreamEvent::AnswerDelta {
            content: content.to_string(),
        }
    }

    #[test]
    fn test_decode_complete_lines() {
        let buffer = b"data: {\"type\":\"metadata\",\"retrieval_time\":0.25,\"chunks\":4}\n\n\
                       data: {\"type\":\"answer\",\"content\":\"Hi\"}\n\n\
                       data: {\"type\":\"timing\",\"generation_time\":1.5,\"total_time\":1.8}\n\n\
                       data: {\"type\":\"done\"}\n\n";
        let decoded = decode(buffer);
        assert_eq!(
            decoded.events,
            vec![
                StreamEvent::Metadata {
                    retrieval_time_secs: 0.25
                },
                answer("Hi"),
                StreamEvent::Timing {
                    generation_time_secs: 1.5
                },
                StreamEvent::Done,
            ]
        );
        assert!(decoded.remainder.is_empty());
        assert_eq!(decoded.discarded, 0);
    }

    #[test]
    fn test_decode_keeps_unterminated_tail() {
        let decoded = decode(b"data: {\"type\":\"done\"}\ndata: {\"type\":\"ans");
        assert_eq!(decoded.events, vec![StreamEvent::Done]);
        assert_eq!(decoded.remainder, b"data: {\"type\":\"ans");
    }

    #[test]
    fn test_line_split_across_chunks_yields_one_event() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"ans").is_empty());
        let events = decoder.push(b"wer\",\"content\":\"x\"}\n");
        assert_eq!(events, vec![answer("x")]);
        assert_eq!(decoder.discarded(), 0);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_split_inside_multibyte_character() {
        let line = "data: {\"type\":\"answer\",\"content\":\"caf\u{e9}\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(decoder.push(&line[split..]), vec![answer("café")]);
    }

    #[test]
    fn test_non_frame_lines_are_ignored() {
        let decoded = decode(b": keepalive\nevent: message\n\nid: 4\n");
        assert!(decoded.events.is_empty());
        assert_eq!(decoded.discarded, 0);
    }

    #[test]
    fn test_malformed_frames_are_discarded_without_aborting() {
        let decoded = decode(
            b"data: {not json\n\
              data: {\"type\":\"sources\",\"sources\":[]}\n\
              data: {\"type\":\"answer\"}\n\
              data: {\"type\":\"answer\",\"content\":\"ok\"}\n",
        );
        assert_eq!(decoded.events, vec![answer("ok")]);
        assert_eq!(decoded.discarded, 3);
    }

    #[test]
    fn test_prefix_requires_space() {
        assert_eq!(parse_frame("data:{\"type\":\"done\"}"), Frame::Ignored);
    }

    #[test]
    fn test_crlf_lines() {
        let decoded = decode(b"data: {\"type\":\"done\"}\r\n\r\n");
        assert_eq!(decoded.events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_error_event() {
        assert_eq!(
            parse_frame(r#"data: {"type":"error","message":"index missing"}"#),
            Frame::Event(StreamEvent::Error {
                message: "index missing".to_string()
            })
        );
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"done\"}").is_empty());
        assert_eq!(decoder.finish(), vec![StreamEvent::Done]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_finish_counts_malformed_tail() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: {\"type\":\"answ");
        assert!(decoder.finish().is_empty());
        assert_eq!(decoder.discarded(), 1);
    }

    #[test]
    fn test_many_events_in_one_chunk_keep_order() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b"data: {\"type\":\"answer\",\"content\":\"a\"}\n\
              data: {\"type\":\"answer\",\"content\":\"b\"}\n\
              data: {\"type\":\"answer\",\"content\":\"c\"}\n",
        );
        assert_eq!(events, vec![answer("a"), answer("b"), answer("c")]);
    }
}
