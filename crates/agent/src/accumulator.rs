//! Reassembles streamed tool-call fragments into whole calls.

use std::collections::BTreeMap;

use studiobot_core::message::MessageToolCall;
use studiobot_core::provider::ToolCallDelta;

/// A call being assembled from fragments that share a slot index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl PendingToolCall {
    /// Arguments as sent to the dispatcher; empty text means no arguments.
    pub fn arguments_or_empty_object(&self) -> &str {
        if self.arguments.trim().is_empty() {
            "{}"
        } else {
            &self.arguments
        }
    }

    pub fn to_message_call(&self, fallback_id: &str) -> MessageToolCall {
        MessageToolCall {
            id: if self.id.is_empty() {
                fallback_id.to_string()
            } else {
                self.id.clone()
            },
            name: self.name.clone(),
            arguments: self.arguments_or_empty_object().to_string(),
        }
    }
}

/// Slots keyed by the provider's index, finished in index order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<u32, PendingToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id and name stick once set; argument text is appended in arrival order.
    pub fn merge(&mut self, delta: &ToolCallDelta) {
        let slot = self.slots.entry(delta.index).or_default();
        if slot.id.is_empty()
            && let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty())
        {
            slot.id = id.to_string();
        }
        if slot.name.is_empty()
            && let Some(name) = delta.name.as_deref().filter(|n| !n.is_empty())
        {
            slot.name = name.to_string();
        }
        if let Some(fragment) = &delta.arguments {
            slot.arguments.push_str(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn finish(self) -> Vec<PendingToolCall> {
        self.slots.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.map(String::from),
        }
    }

    #[test]
    fn fragments_concatenate_in_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.merge(&delta(0, Some("call_1"), Some("export_pdf"), Some("{\"a\"")));
        acc.merge(&delta(0, None, None, Some(":1}")));
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, "{\"a\":1}");
        let parsed: serde_json::Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn id_and_name_are_not_overwritten() {
        let mut acc = ToolCallAccumulator::new();
        acc.merge(&delta(0, Some("call_1"), Some("crop_image"), None));
        acc.merge(&delta(0, Some("call_2"), Some("export_pdf"), Some("{}")));
        let calls = acc.finish();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "crop_image");
    }

    #[test]
    fn late_id_fills_empty_slot() {
        let mut acc = ToolCallAccumulator::new();
        acc.merge(&delta(0, Some(""), None, Some("{")));
        acc.merge(&delta(0, Some("call_9"), Some("load_skill"), Some("}")));
        let call = &acc.finish()[0];
        assert_eq!(call.id, "call_9");
        assert_eq!(call.name, "load_skill");
    }

    #[test]
    fn slots_finish_in_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.merge(&delta(2, Some("c"), Some("crop_image"), None));
        acc.merge(&delta(0, Some("a"), Some("export_pdf"), None));
        let ids: Vec<_> = acc.finish().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn empty_arguments_become_object() {
        let call = PendingToolCall {
            id: String::new(),
            name: "export_pdf".into(),
            arguments: "  ".into(),
        };
        assert_eq!(call.arguments_or_empty_object(), "{}");
        let message_call = call.to_message_call("export_pdf");
        assert_eq!(message_call.id, "export_pdf");
        assert_eq!(message_call.arguments, "{}");
    }
}
