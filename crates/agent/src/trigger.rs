//! Phrase-based tool trigger.
//!
//! Looks at the latest user utterance and decides whether tools should be
//! offered at all, and whether one obvious tool should be forced so the model
//! does not have to negotiate.

/// Substrings that suggest the user wants a file written or an image touched.
const TRIGGER_PHRASES: &[&str] = &[
    "export",
    "save",
    "convert",
    "resize",
    "crop",
    "draw",
    "picture of",
    "pdf",
    "docx",
    "word doc",
    "spreadsheet",
    "xlsx",
    "excel file",
    "excel sheet",
    "in excel",
    "to excel",
    "image",
    "illustration",
    "sketch",
    "render",
    "skill",
];

/// Checked in order; the first hit wins.
const FORCED_TOOLS: &[(&[&str], &str)] = &[
    (&["resize"], "resize_image"),
    (&["crop"], "crop_image"),
    (&["convert"], "convert_image"),
    (&["docx", "word doc"], "export_docx"),
    (&["pdf"], "export_pdf"),
    (
        &["xlsx", "spreadsheet", "excel file", "excel sheet", "in excel", "to excel"],
        "export_xlsx",
    ),
    (&["image", "draw", "picture"], "generate_image"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerDecision {
    pub might_need_tools: bool,
    pub forced_tool: Option<&'static str>,
}

pub fn might_need_tools(utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    TRIGGER_PHRASES.iter().any(|p| lowered.contains(p))
}

pub fn forced_tool(utterance: &str) -> Option<&'static str> {
    let lowered = utterance.to_lowercase();
    FORCED_TOOLS
        .iter()
        .find(|(phrases, _)| phrases.iter().any(|p| lowered.contains(p)))
        .map(|(_, tool)| *tool)
}

pub fn evaluate(utterance: &str) -> TriggerDecision {
    TriggerDecision {
        might_need_tools: might_need_tools(utterance),
        forced_tool: forced_tool(utterance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_request() {
        let decision = evaluate("please resize this image");
        assert_eq!(decision.forced_tool, Some("resize_image"));
        assert!(decision.might_need_tools);
    }

    #[test]
    fn word_doc_request() {
        assert_eq!(forced_tool("export this as a word doc"), Some("export_docx"));
    }

    #[test]
    fn drawing_request() {
        assert_eq!(forced_tool("draw me a dragon"), Some("generate_image"));
    }

    #[test]
    fn plain_chat_needs_nothing() {
        let decision = evaluate("what makes a good boss fight?");
        assert_eq!(decision, TriggerDecision::default());
        assert_eq!(evaluate(""), TriggerDecision::default());
    }

    #[test]
    fn priority_order() {
        assert_eq!(forced_tool("crop the image then save as pdf"), Some("crop_image"));
        assert_eq!(forced_tool("Convert the PDF"), Some("convert_image"));
        assert_eq!(forced_tool("save the budget as a spreadsheet"), Some("export_xlsx"));
        assert_eq!(forced_tool("SAVE AS PDF"), Some("export_pdf"));
    }

    #[test]
    fn trigger_without_forced_tool() {
        let decision = evaluate("save that for later");
        assert!(decision.might_need_tools);
        assert!(decision.forced_tool.is_none());
    }

    #[test]
    fn excellent_is_not_excel() {
        assert!(!might_need_tools("excellent idea"));
    }
}
