//! Bounded per-agent conversation history.
//!
//! Each agent identity owns a FIFO of at most `cap` turns. Histories are
//! created on first touch and live until cleared. With a snapshot directory
//! configured, every mutation rewrites `<dir>/<agent_id>.json` and a
//! history's first touch reloads it.
//!
//! Concurrent turns for the same agent are not serialized: two flows may
//! interleave their appends.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use studiobot_core::message::{Message, Role};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Snapshot entry: just the role and the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotTurn {
    role: Role,
    content: String,
}

/// On-disk JSON lists of `{role, content}`, one file per agent.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    dir: PathBuf,
    max_items: usize,
}

impl HistorySnapshot {
    pub fn new(dir: impl Into<PathBuf>, max_items: usize) -> Self {
        Self {
            dir: dir.into(),
            max_items,
        }
    }

    fn file_for(&self, agent_id: &str) -> Option<PathBuf> {
        match studiobot_security::resolve_within(&self.dir, &format!("{agent_id}.json")) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "No snapshot file for agent id");
                None
            }
        }
    }

    /// Load the newest `max_items` turns; missing or corrupt files load as empty.
    pub fn load(&self, agent_id: &str) -> Vec<Message> {
        let Some(path) = self.file_for(agent_id) else {
            return Vec::new();
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let turns: Vec<SnapshotTurn> = match serde_json::from_str(&content) {
            Ok(turns) => turns,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupted history snapshot");
                return Vec::new();
            }
        };
        let skip = turns.len().saturating_sub(self.max_items);
        turns
            .into_iter()
            .skip(skip)
            .filter(|t| matches!(t.role, Role::User | Role::Assistant))
            .map(|t| Message {
                role: t.role,
                ..Message::user(t.content)
            })
            .collect()
    }

    /// Write the newest `max_items` turns.
    pub fn save(&self, agent_id: &str, turns: &[Message]) -> std::io::Result<()> {
        let Some(path) = self.file_for(agent_id) else {
            return Ok(());
        };
        std::fs::create_dir_all(&self.dir)?;
        let skip = turns.len().saturating_sub(self.max_items);
        let entries: Vec<SnapshotTurn> = turns
            .iter()
            .skip(skip)
            .map(|m| SnapshotTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, json)
    }

    pub fn clear(&self, agent_id: &str) -> std::io::Result<()> {
        let Some(path) = self.file_for(agent_id) else {
            return Ok(());
        };
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Process-wide history, constructed once and shared via `Arc`.
pub struct HistoryStore {
    cap: usize,
    agents: RwLock<HashMap<String, VecDeque<Message>>>,
    snapshot: Option<HistorySnapshot>,
}

impl HistoryStore {
    /// In-memory history holding at most `cap` turns per agent.
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            agents: RwLock::new(HashMap::new()),
            snapshot: None,
        }
    }

    /// History persisted under `dir`.
    pub fn with_snapshot(cap: usize, dir: impl Into<PathBuf>) -> Self {
        let cap = cap.max(1);
        Self {
            snapshot: Some(HistorySnapshot::new(dir, cap)),
            ..Self::new(cap)
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub async fn append_user(&self, agent_id: &str, text: &str) {
        self.append(agent_id, Message::user(text)).await;
    }

    /// No-op when `text` is blank; otherwise stores it trimmed.
    pub async fn append_assistant(&self, agent_id: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.append(agent_id, Message::assistant(text)).await;
    }

    /// Turns for `agent_id`, oldest first.
    pub async fn read(&self, agent_id: &str) -> Vec<Message> {
        {
            let agents = self.agents.read().await;
            if let Some(turns) = agents.get(agent_id) {
                return turns.iter().cloned().collect();
            }
        }
        let mut agents = self.agents.write().await;
        self.history_mut(&mut agents, agent_id).iter().cloned().collect()
    }

    pub async fn clear(&self, agent_id: &str) {
        let mut agents = self.agents.write().await;
        agents.remove(agent_id);
        if let Some(snapshot) = &self.snapshot
            && let Err(e) = snapshot.clear(agent_id)
        {
            warn!(agent = %agent_id, error = %e, "Failed to delete history snapshot");
        }
        debug!(agent = %agent_id, "History cleared");
    }

    /// Agent ids with a live in-memory history.
    pub async fn agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn append(&self, agent_id: &str, message: Message) {
        let mut agents = self.agents.write().await;
        let cap = self.cap;
        let turns = self.history_mut(&mut agents, agent_id);
        turns.push_back(message);
        while turns.len() > cap {
            turns.pop_front();
        }

        // Saved under the lock so snapshots land in mutation order.
        if let Some(snapshot) = &self.snapshot {
            let turns: Vec<Message> = turns.iter().cloned().collect();
            if let Err(e) = snapshot.save(agent_id, &turns) {
                warn!(agent = %agent_id, error = %e, "Failed to write history snapshot");
            }
        }
    }

    fn history_mut<'a>(
        &self,
        agents: &'a mut HashMap<String, VecDeque<Message>>,
        agent_id: &str,
    ) -> &'a mut VecDeque<Message> {
        agents.entry(agent_id.to_string()).or_insert_with(|| {
            let loaded: VecDeque<Message> = self
                .snapshot
                .as_ref()
                .map(|s| s.load(agent_id).into())
                .unwrap_or_default();
            debug!(agent = %agent_id, turns = loaded.len(), "History created");
            loaded
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_in_order() {
        let store = HistoryStore::new(10);
        store.append_user("creative_director", "hi").await;
        store.append_assistant("creative_director", "hello!").await;

        let turns = store.read("creative_director").await;
        assert_eq!(turns, vec![Message::user("hi"), Message::assistant("hello!")]);
    }

    #[tokio::test]
    async fn blank_assistant_turns_are_dropped() {
        let store = HistoryStore::new(10);
        store.append_assistant("a", "   \n").await;
        store.append_assistant("a", "  done  ").await;
        assert_eq!(store.read("a").await, vec![Message::assistant("done")]);
    }

    #[tokio::test]
    async fn cap_evicts_oldest_first() {
        let store = HistoryStore::new(3);
        for i in 0..10 {
            store.append_user("a", &format!("m{i}")).await;
            assert!(store.read("a").await.len() <= 3);
        }
        let contents: Vec<_> = store.read("a").await.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn agents_are_isolated() {
        let store = HistoryStore::new(5);
        store.append_user("creative_director", "one").await;
        store.append_user("art_director", "two").await;
        assert_eq!(store.read("creative_director").await.len(), 1);
        assert_eq!(store.read("art_director").await[0].content, "two");
        assert!(store.read("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_one_agent() {
        let store = HistoryStore::new(5);
        store.append_user("a", "x").await;
        store.append_user("b", "y").await;
        store.clear("a").await;
        assert!(store.read("a").await.is_empty());
        assert_eq!(store.read("b").await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = HistoryStore::with_snapshot(4, dir.path());
            store.append_user("a", "remember me").await;
            store.append_assistant("a", "noted").await;
        }

        let raw = std::fs::read_to_string(dir.path().join("a.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json[0], serde_json::json!({"role": "user", "content": "remember me"}));

        let store = HistoryStore::with_snapshot(4, dir.path());
        let turns = store.read("a").await;
        assert_eq!(turns, vec![Message::user("remember me"), Message::assistant("noted")]);
    }

    #[tokio::test]
    async fn snapshot_respects_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::with_snapshot(2, dir.path());
        for i in 0..5 {
            store.append_user("a", &format!("m{i}")).await;
        }
        let snapshot = HistorySnapshot::new(dir.path(), 2);
        let loaded = snapshot.load("a");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].content, "m4");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_leave_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(HistoryStore::with_snapshot(50, dir.path()));

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.append_user("a", &format!("m{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let on_disk: Vec<String> = HistorySnapshot::new(dir.path(), 50)
            .load("a")
            .into_iter()
            .map(|m| m.content)
            .collect();
        let in_memory: Vec<String> = store.read("a").await.into_iter().map(|m| m.content).collect();
        assert_eq!(on_disk.len(), 40);
        assert_eq!(on_disk, in_memory);
    }

    #[tokio::test]
    async fn clear_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::with_snapshot(4, dir.path());
        store.append_user("a", "x").await;
        assert!(dir.path().join("a.json").exists());
        store.clear("a").await;
        assert!(!dir.path().join("a.json").exists());
    }

    #[test]
    fn corrupted_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "{nope").unwrap();
        assert!(HistorySnapshot::new(dir.path(), 5).load("a").is_empty());
    }

    #[test]
    fn traversal_agent_ids_never_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = HistorySnapshot::new(dir.path(), 5);
        assert!(snapshot.save("../escape", &[Message::user("x")]).is_ok());
        assert!(!dir.path().parent().unwrap().join("escape.json").exists());
    }
}
