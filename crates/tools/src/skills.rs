//! Skills: folders holding a `SKILL.md` whose frontmatter names and describes
//! the skill.
//!
//! Only names and descriptions go into the system prompt (as an
//! `<available_skills>` block); the model pulls the full instructions with
//! the `load_skill` tool when a task matches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use studiobot_core::error::ToolError;
use studiobot_core::tool::Tool;
use tracing::debug;

use crate::export::optional_str;

const SKILL_FILE: &str = "SKILL.md";
const OPENAI_META: &str = "agents/openai.yaml";
const MAX_DESCRIPTION: usize = 400;

static FRONTMATTER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^---[ \t]*\r?\n(.*?)\r?\n---").ok());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    /// Folder name under the skills directory
    pub folder: String,
}

/// `key: value` pairs between the leading `---` fences. Surrounding quotes are dropped.
pub fn parse_frontmatter(content: &str) -> HashMap<String, String> {
    let Some(block) = FRONTMATTER
        .as_ref()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
    else {
        return HashMap::new();
    };
    block
        .as_str()
        .lines()
        .filter_map(|line| line.trim().split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim())))
        .collect()
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote))
        {
            return inner.replace("\\\"", "\"").replace("\\'", "'");
        }
    }
    value.to_string()
}

/// `interface.short_description` from an optional `agents/openai.yaml`.
fn openai_short_description(folder: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(folder.join(OPENAI_META)).ok()?;
    raw.lines()
        .filter_map(|l| l.trim().strip_prefix("short_description:"))
        .map(|v| v.trim().trim_matches(['"', '\'']).to_string())
        .find(|v| !v.is_empty())
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub struct SkillLibrary {
    dir: PathBuf,
}

impl SkillLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn skill_folders(&self) -> Vec<(String, PathBuf, String)> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut folders: Vec<_> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let path = e.path();
                let raw = std::fs::read_to_string(path.join(SKILL_FILE)).ok()?;
                Some((e.file_name().to_string_lossy().into_owned(), path, raw))
            })
            .collect();
        folders.sort_by(|a, b| a.0.cmp(&b.0));
        folders
    }

    /// Every folder with a readable `SKILL.md`, sorted by folder name.
    pub fn discover(&self) -> Vec<SkillInfo> {
        self.skill_folders()
            .into_iter()
            .map(|(folder, path, raw)| {
                let frontmatter = parse_frontmatter(&raw);
                let name = frontmatter
                    .get("name")
                    .map(|n| n.trim())
                    .filter(|n| !n.is_empty())
                    .unwrap_or(&folder)
                    .to_string();
                let description = openai_short_description(&path)
                    .or_else(|| frontmatter.get("description").cloned())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                SkillInfo {
                    name,
                    description,
                    folder,
                }
            })
            .collect()
    }

    /// Full `SKILL.md` for a folder name or frontmatter name, ignoring case.
    pub fn content(&self, skill_name: &str) -> Option<String> {
        let wanted = skill_name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.skill_folders().into_iter().find_map(|(folder, _, raw)| {
            let by_name = parse_frontmatter(&raw)
                .get("name")
                .is_some_and(|n| n.trim().to_lowercase() == wanted);
            (folder.to_lowercase() == wanted || by_name).then_some(raw)
        })
    }

    /// `<available_skills>` block for the system prompt, empty when there are no skills.
    pub fn available_skills_xml(&self) -> String {
        let skills = self.discover();
        if skills.is_empty() {
            return String::new();
        }
        let entries: Vec<String> = skills
            .iter()
            .map(|s| {
                let description: String = s.description.chars().take(MAX_DESCRIPTION).collect();
                format!(
                    "  <skill>\n    <name>{}</name>\n    <description>{}</description>\n  </skill>",
                    escape_xml(&s.name),
                    escape_xml(&description)
                )
            })
            .collect();
        format!("<available_skills>\n{}\n</available_skills>", entries.join("\n"))
    }
}

pub struct LoadSkillTool {
    library: Arc<SkillLibrary>,
}

impl LoadSkillTool {
    pub fn new(library: Arc<SkillLibrary>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        "load_skill"
    }

    fn description(&self) -> &str {
        "Load the full instructions for an available skill. Call this when the user's task matches a skill listed in <available_skills> so you can follow that skill's guidelines."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "skill_name": { "type": "string", "description": "Name of the skill from <available_skills>" }
            },
            "required": ["skill_name"]
        })
    }

    fn event_name(&self) -> &str {
        "skill_loaded"
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let skill_name = optional_str(&arguments, "skill_name")
            .ok_or_else(|| ToolError::InvalidArguments("Tool arg 'skill_name' is required.".into()))?;
        let content = self
            .library
            .content(&skill_name)
            .ok_or_else(|| ToolError::failed(self.name(), format!("Skill '{skill_name}' not found.")))?;
        debug!(skill = %skill_name, bytes = content.len(), "Skill loaded");
        Ok(json!({ "skill_name": skill_name, "content": content }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, folder: &str, body: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SKILL_FILE), body).unwrap();
    }

    #[test]
    fn frontmatter_parsed() {
        let fm = parse_frontmatter("---\nname: \"level-design\"\ndescription: Build levels: fast\n---\nBody");
        assert_eq!(fm["name"], "level-design");
        assert_eq!(fm["description"], "Build levels: fast");
        assert!(parse_frontmatter("no frontmatter").is_empty());
    }

    #[test]
    fn discover_and_render_block() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "b-folder", "---\nname: storyboard\ndescription: Shots & panels\n---\n# Steps");
        write_skill(tmp.path(), "a-folder", "# No frontmatter");
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();

        let library = SkillLibrary::new(tmp.path());
        let skills = library.discover();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].name, "a-folder");
        assert_eq!(skills[1].name, "storyboard");

        let xml = library.available_skills_xml();
        assert!(xml.starts_with("<available_skills>"));
        assert!(xml.contains("<description>Shots &amp; panels</description>"));
    }

    #[test]
    fn openai_yaml_description_wins() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "pitch", "---\ndescription: long form\n---\n");
        std::fs::create_dir_all(tmp.path().join("pitch/agents")).unwrap();
        std::fs::write(
            tmp.path().join("pitch/agents/openai.yaml"),
            "interface:\n  display_name: Pitch\n  short_description: 'Short pitch'\n",
        )
        .unwrap();
        let skills = SkillLibrary::new(tmp.path()).discover();
        assert_eq!(skills[0].description, "Short pitch");
    }

    #[test]
    fn missing_dir_means_no_skills() {
        let library = SkillLibrary::new("/definitely/not/here");
        assert!(library.discover().is_empty());
        assert_eq!(library.available_skills_xml(), "");
    }

    #[tokio::test]
    async fn load_skill_by_folder_or_name() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "story", "---\nname: Storyboard\n---\nDo the thing");
        let tool = LoadSkillTool::new(Arc::new(SkillLibrary::new(tmp.path())));

        let out = tool.execute(json!({"skill_name": "STORY"})).await.unwrap();
        assert!(out["content"].as_str().unwrap().contains("Do the thing"));
        let out = tool.execute(json!({"skill_name": "storyboard"})).await.unwrap();
        assert_eq!(out["skill_name"], "storyboard");

        let err = tool.execute(json!({"skill_name": "nope"})).await.unwrap_err();
        assert_eq!(err.to_string(), "Skill 'nope' not found.");
    }
}
