//! Persona files on disk: `<dir>/<agent_id>.json`.

use std::path::PathBuf;

use serde_json::Value;
use studiobot_config::{ChatConfig, PersonaConfig};
use studiobot_core::persona::PersonaSource;
use tracing::warn;

/// Known agents and the folder holding their persona JSON.
#[derive(Debug, Clone)]
pub struct PersonaDirectory {
    dir: PathBuf,
    agents: Vec<String>,
    default_agent: String,
}

impl PersonaDirectory {
    pub fn new(dir: impl Into<PathBuf>, agents: Vec<String>, default_agent: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            agents,
            default_agent: default_agent.into(),
        }
    }

    pub fn from_config(personas: &PersonaConfig, chat: &ChatConfig) -> Self {
        Self::new(&personas.dir, personas.agents.clone(), &chat.default_agent)
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    fn load(&self, agent_id: &str) -> Option<Value> {
        if !self.agents.iter().any(|a| a == agent_id) {
            return None;
        }
        let path = self.dir.join(format!("{agent_id}.json"));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(agent = agent_id, path = %path.display(), error = %e, "Persona file unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(agent = agent_id, path = %path.display(), error = %e, "Persona file is not valid JSON");
                None
            }
        }
    }
}

impl PersonaSource for PersonaDirectory {
    fn normalize(&self, raw: Option<&str>) -> String {
        let cleaned = raw
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .replace(['-', ' '], "_");
        if self.agents.contains(&cleaned) {
            cleaned
        } else {
            self.default_agent.clone()
        }
    }

    fn persona_text(&self, agent_id: &str) -> String {
        self.load(agent_id)
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_default()
    }

    fn persona_description(&self, agent_id: &str) -> String {
        self.load(agent_id)
            .and_then(|v| v.get("description_prompt").and_then(Value::as_str).map(str::trim).map(String::from))
            .unwrap_or_default()
    }
}
