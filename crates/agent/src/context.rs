//! System prelude assembly.
//!
//! Produces the system messages that open every provider request, in order:
//!
//! 1. behavioural instruction (persona description + how to use context)
//! 2. tool instruction (catalogue, plus `<available_skills>` when present)
//! 3. persona block, with the active project note appended
//! 4. retrieved context, only when there is any

use std::sync::Arc;

use studiobot_core::knowledge::RetrievedChunk;
use studiobot_core::message::Message;
use studiobot_core::persona::PersonaSource;
use studiobot_core::provider::ToolDefinition;
use studiobot_tools::SkillLibrary;

const FALLBACK_DESCRIPTION: &str = "You are a game development expert.";
pub const CONTEXT_PREFIX: &str = "CONTEXT:\n";

pub struct ContextAssembler {
    personas: Arc<dyn PersonaSource>,
    tools: Vec<ToolDefinition>,
    skills: Option<Arc<SkillLibrary>>,
}

impl ContextAssembler {
    pub fn new(personas: Arc<dyn PersonaSource>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            personas,
            tools,
            skills: None,
        }
    }

    pub fn with_skills(mut self, skills: Arc<SkillLibrary>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn personas(&self) -> &Arc<dyn PersonaSource> {
        &self.personas
    }

    fn behaviour_instruction(&self, agent_id: &str) -> String {
        let description = self.personas.persona_description(agent_id);
        let prefix = if description.is_empty() {
            FALLBACK_DESCRIPTION
        } else {
            description.as_str()
        };
        format!(
            "{prefix} Use provided context. If context is insufficient, say what is missing instead of inventing. \
             When using context, prefer citing it. If the answer is not supported by context, \
             say so and propose what to add to the KB."
        )
    }

    fn tool_instruction(&self) -> String {
        let mut text = String::from(
            "If the user explicitly requests saving or exporting a document (PDF, Word or spreadsheet), \
             produce the full content first, then call the matching export tool with the final content \
             and a sensible title. Use the image tools only when the user asks to create or edit an image. \
             If the user did NOT request a file or an image, do NOT call a tool.",
        );
        if !self.tools.is_empty() {
            text.push_str("\n\nAvailable tools:");
            for tool in &self.tools {
                text.push_str(&format!("\n- {}: {}", tool.name, tool.description));
            }
        }
        if let Some(skills) = &self.skills {
            let block = skills.available_skills_xml();
            if !block.is_empty() {
                text.push_str("\n\n");
                text.push_str(&block);
            }
        }
        text
    }

    /// Ordered system messages for one chat turn.
    pub fn assemble(
        &self,
        agent_id: &str,
        chunks: &[RetrievedChunk],
        project_key: Option<&str>,
    ) -> Vec<Message> {
        let mut messages = vec![
            Message::system(self.behaviour_instruction(agent_id)),
            Message::system(self.tool_instruction()),
        ];

        let persona_text = self.personas.persona_text(agent_id);
        let mut persona_block = if persona_text.is_empty() {
            String::new()
        } else {
            format!("*** PERSONA ***\nThe agent represent this persona:\n{persona_text}")
        };
        if let Some(key) = project_key.map(str::trim).filter(|k| !k.is_empty()) {
            if !persona_block.is_empty() {
                persona_block.push_str("\n\n");
            }
            persona_block.push_str(&format!(
                "Active project key: '{key}'. Pass project_key='{key}' to any tool that writes files."
            ));
        }
        if !persona_block.is_empty() {
            messages.push(Message::system(persona_block));
        }

        if let Some(block) = context_block(chunks) {
            messages.push(Message::system(block));
        }
        messages
    }
}

/// `CONTEXT:` block listing each chunk with its source, or `None` without chunks.
pub fn context_block(chunks: &[RetrievedChunk]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    let formatted: Vec<String> = chunks
        .iter()
        .map(|c| format!("[Source: {} | chunk {}] {}", c.title, c.chunk_index, c.content))
        .collect();
    Some(format!("{CONTEXT_PREFIX}{}", formatted.join("\n\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedPersona {
        text: &'static str,
        description: &'static str,
    }

    impl PersonaSource for FixedPersona {
        fn normalize(&self, _raw: Option<&str>) -> String {
            "creative_director".into()
        }
        fn persona_text(&self, _agent_id: &str) -> String {
            self.text.into()
        }
        fn persona_description(&self, _agent_id: &str) -> String {
            self.description.into()
        }
    }

    fn assembler(text: &'static str, description: &'static str) -> ContextAssembler {
        let tools = vec![ToolDefinition {
            name: "export_pdf".into(),
            description: "Save a PDF.".into(),
            parameters: json!({"type": "object"}),
        }];
        ContextAssembler::new(Arc::new(FixedPersona { text, description }), tools)
    }

    fn chunk(title: &str, index: usize, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            source_id: "s1".into(),
            chunk_index: index,
            content: content.into(),
            score: 0.9,
            title: title.into(),
        }
    }

    #[test]
    fn no_context_block_without_chunks() {
        let messages = assembler("{}", "").assemble("creative_director", &[], None);
        assert!(!messages.iter().any(|m| m.content.starts_with(CONTEXT_PREFIX)));
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn full_prelude_order() {
        let chunks = [chunk("Lore", 0, "Dragons sleep."), chunk("Lore", 3, "Knights wake.")];
        let messages = assembler("{\"name\": \"Ada\"}", "You are Ada.").assemble(
            "creative_director",
            &chunks,
            Some("space-game"),
        );
        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.starts_with("You are Ada. Use provided context."));
        assert!(messages[1].content.contains("- export_pdf: Save a PDF."));
        assert!(messages[2].content.starts_with("*** PERSONA ***\nThe agent represent this persona:\n"));
        assert!(messages[2].content.ends_with(
            "Active project key: 'space-game'. Pass project_key='space-game' to any tool that writes files."
        ));
        assert_eq!(
            messages[3].content,
            "CONTEXT:\n[Source: Lore | chunk 0] Dragons sleep.\n\n[Source: Lore | chunk 3] Knights wake."
        );
    }

    #[test]
    fn missing_persona_degrades() {
        let messages = assembler("", "").assemble("creative_director", &[], None);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.starts_with("You are a game development expert."));
    }

    #[test]
    fn project_note_stands_alone_without_persona() {
        let messages = assembler("", "").assemble("creative_director", &[], Some("demo"));
        assert_eq!(messages.len(), 3);
        assert!(messages[2].content.starts_with("Active project key: 'demo'."));
    }

    #[test]
    fn skills_listed_in_tool_instruction() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("storyboard");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), "---\nname: storyboard\ndescription: Plan shots\n---\n").unwrap();

        let messages = assembler("", "")
            .with_skills(Arc::new(SkillLibrary::new(tmp.path())))
            .assemble("creative_director", &[], None);
        assert!(messages[1].content.contains("<available_skills>"));
        assert!(messages[1].content.contains("<name>storyboard</name>"));
    }
}
