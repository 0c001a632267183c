//! Transcript accumulation for a single listening phase.
//!
//! The recognition engine emits a stream of segments. Final segments are
//! accumulated for the lifetime of the listening phase (surviving engine
//! restarts); interim segments are display-only and each one replaces the
//! previous interim.

use serde::{Deserialize, Serialize};

/// One recognition result chunk from the host engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Recognized text for this chunk
    pub text: String,
    /// Whether the engine has committed this chunk
    #[serde(rename = "isFinal")]
    pub is_final: bool,
}

impl TranscriptSegment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn fin(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Accumulates final segments in arrival order, tracking the latest interim
#[derive(Debug, Clone, Default)]
pub struct TranscriptBuffer {
    finals: Vec<String>,
    interim: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a segment to the accumulator or the interim slot
    pub fn push(&mut self, segment: TranscriptSegment) {
        if segment.is_final {
            self.push_final(segment.text);
        } else {
            self.set_interim(segment.text);
        }
    }

    /// Append a committed chunk; a final clears the interim it supersedes
    pub fn push_final(&mut self, text: impl Into<String>) {
        self.finals.push(text.into());
        self.interim.clear();
    }

    /// Replace the current interim chunk
    pub fn set_interim(&mut self, text: impl Into<String>) {
        self.interim = text.into();
    }

    /// All final segments joined with single spaces, in arrival order
    pub fn accumulated_text(&self) -> String {
        self.finals.join(" ")
    }

    /// The latest uncommitted chunk, empty when none is pending
    pub fn interim_text(&self) -> &str {
        &self.interim
    }

    /// Accumulated text plus the pending interim, for live display
    pub fn preview(&self) -> String {
        if self.interim.is_empty() {
            self.accumulated_text()
        } else if self.finals.is_empty() {
            self.interim.clone()
        } else {
            format!("{} {}", self.accumulated_text(), self.interim)
        }
    }

    /// True when no final segment has been committed
    pub fn is_empty(&self) -> bool {
        self.finals.is_empty()
    }

    /// Return the accumulated text and clear both buffers
    pub fn take(&mut self) -> String {
        let text = self.accumulated_text();
        self.reset();
        text
    }

    /// Clear accumulated finals and the interim buffer
    pub fn reset(&mut self) {
        self.finals.clear();
        self.interim.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_finals_in_arrival_order() {
        let mut buffer = TranscriptBuffer::new();
        buffer.push(TranscriptSegment::fin("hello"));
        buffer.push(TranscriptSegment::fin("there"));
        buffer.push(TranscriptSegment::fin("friend"));
        assert_eq!(buffer.accumulated_text(), "hello there friend");
    }

    #[test]
    fn interims_never_enter_accumulated_text() {
        let mut buffer = TranscriptBuffer::new();
        buffer.push(TranscriptSegment::interim("hel"));
        buffer.push(TranscriptSegment::interim("hello"));
        buffer.push(TranscriptSegment::fin("hello"));
        buffer.push(TranscriptSegment::interim("wor"));
        assert_eq!(buffer.accumulated_text(), "hello");
        assert_eq!(buffer.interim_text(), "wor");
    }

    #[test]
    fn interim_is_replaced_by_each_newer_interim() {
        let mut buffer = TranscriptBuffer::new();
        buffer.set_interim("h");
        buffer.set_interim("he");
        buffer.set_interim("hey");
        assert_eq!(buffer.interim_text(), "hey");
    }

    #[test]
    fn final_clears_superseded_interim() {
        let mut buffer = TranscriptBuffer::new();
        buffer.set_interim("good morn");
        buffer.push_final("good morning");
        assert_eq!(buffer.interim_text(), "");
        assert_eq!(buffer.accumulated_text(), "good morning");
    }

    #[test]
    fn preview_joins_accumulated_and_interim() {
        let mut buffer = TranscriptBuffer::new();
        assert_eq!(buffer.preview(), "");

        buffer.set_interim("hi");
        assert_eq!(buffer.preview(), "hi");

        buffer.push_final("hi");
        buffer.set_interim("how are");
        assert_eq!(buffer.preview(), "hi how are");
    }

    #[test]
    fn take_returns_text_and_clears_everything() {
        let mut buffer = TranscriptBuffer::new();
        buffer.push_final("see");
        buffer.push_final("you");
        buffer.set_interim("soo");

        assert_eq!(buffer.take(), "see you");
        assert!(buffer.is_empty());
        assert_eq!(buffer.interim_text(), "");
        assert_eq!(buffer.accumulated_text(), "");
    }

    #[test]
    fn empty_buffer_yields_empty_text() {
        let mut buffer = TranscriptBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.take(), "");
    }

    #[test]
    fn segment_wire_shape_uses_is_final_camel_case() {
        let segment = TranscriptSegment::fin("hello");
        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["isFinal"], true);
    }
}
