//! Outward chat events and their server-sent-event framing.
//!
//! Wire format per event: `event: <kind>\n`, one `data: <line>\n` per payload
//! line, then a blank line. Payload line breaks (`\r\n`, `\r`, `\n`) are
//! normalised before splitting so a stray carriage return can never end a
//! field early.

use serde::Serialize;
use serde_json::Value;
use studiobot_core::knowledge::RetrievedChunk;

/// Retrieval hits grouped by source, in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceGroup {
    pub source_id: String,
    pub title: String,
    pub chunks: Vec<usize>,
    pub scores: Vec<f32>,
}

pub fn group_sources(chunks: &[RetrievedChunk]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    for chunk in chunks {
        match groups.iter_mut().find(|g| g.source_id == chunk.source_id) {
            Some(group) => {
                group.chunks.push(chunk.chunk_index);
                group.scores.push(chunk.score);
            }
            None => groups.push(SourceGroup {
                source_id: chunk.source_id.clone(),
                title: chunk.title.clone(),
                chunks: vec![chunk.chunk_index],
                scores: vec![chunk.score],
            }),
        }
    }
    groups
}

/// One unit of observable progress in a chat flow.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Text fragment, in arrival order.
    Token(String),
    /// Outcome of a dispatched tool under the tool's own event name.
    ToolResult { event: String, payload: Value },
    Sources(Vec<SourceGroup>),
    Error(String),
    /// Always last, exactly once.
    Done,
}

impl ChatEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Token(_) => "token",
            Self::ToolResult { event, .. } => event,
            Self::Sources(_) => "sources",
            Self::Error(_) => "error",
            Self::Done => "done",
        }
    }

    pub fn data(&self) -> String {
        match self {
            Self::Token(text) | Self::Error(text) => text.clone(),
            Self::ToolResult { payload, .. } => payload.to_string(),
            Self::Sources(groups) => serde_json::to_string(groups).unwrap_or_else(|_| "[]".into()),
            Self::Done => String::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn to_sse(&self) -> String {
        sse_frame(self.kind(), &self.data())
    }
}

pub fn sse_frame(event: &str, data: &str) -> String {
    let normalized = data.replace("\r\n", "\n").replace('\r', "\n");
    let mut frame = format!("event: {event}\n");
    for line in normalized.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(source: &str, index: usize, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            source_id: source.into(),
            chunk_index: index,
            content: String::new(),
            score,
            title: format!("title-{source}"),
        }
    }

    #[test]
    fn single_line_frame() {
        assert_eq!(sse_frame("token", "Hello"), "event: token\ndata: Hello\n\n");
    }

    #[test]
    fn multi_line_payload_repeats_data() {
        assert_eq!(
            sse_frame("token", "a\nb\r\nc\rd"),
            "event: token\ndata: a\ndata: b\ndata: c\ndata: d\n\n"
        );
    }

    #[test]
    fn done_has_empty_data_line() {
        assert_eq!(ChatEvent::Done.to_sse(), "event: done\ndata: \n\n");
    }

    #[test]
    fn tool_result_uses_tool_event_name() {
        let event = ChatEvent::ToolResult {
            event: "pdf_saved".into(),
            payload: json!({"ok": true}),
        };
        assert_eq!(event.kind(), "pdf_saved");
        assert_eq!(event.to_sse(), "event: pdf_saved\ndata: {\"ok\":true}\n\n");
    }

    #[test]
    fn sources_grouped_in_first_seen_order() {
        let groups = group_sources(&[chunk("b", 2, 0.9), chunk("a", 0, 0.8), chunk("b", 5, 0.7)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].source_id, "b");
        assert_eq!(groups[0].chunks, vec![2, 5]);
        assert_eq!(groups[0].scores, vec![0.9, 0.7]);
        assert_eq!(groups[1].title, "title-a");

        let data = ChatEvent::Sources(groups).data();
        let parsed: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed[0]["chunks"], json!([2, 5]));
    }
}
