//! Process-wide services, built once from configuration and shared by handlers.

use std::sync::Arc;

use studiobot_agent::{ChatOrchestrator, ContextAssembler, OrchestratorSettings, PersonaDirectory};
use studiobot_config::AppConfig;
use studiobot_core::provider::Provider;
use studiobot_memory::{HistoryStore, KnowledgeBase, ProjectPaths};
use studiobot_tools::{OutputLayout, SkillLibrary};
use tracing::info;

const PROJECT_PATHS_FILE: &str = "project_paths.json";
const KNOWLEDGE_FILE: &str = "knowledge.jsonl";

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: ChatOrchestrator,
    pub knowledge: Arc<KnowledgeBase>,
    pub layout: Arc<OutputLayout>,
    pub skills: Arc<SkillLibrary>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire every service from `config`, using the provider it selects.
    pub fn build(config: AppConfig) -> Self {
        let provider = studiobot_providers::build_from_config(&config);
        Self::with_provider(config, provider)
    }

    /// Wire every service around an explicit provider.
    pub fn with_provider(mut config: AppConfig, provider: Arc<dyn Provider>) -> Self {
        if config.knowledge.store_path.is_none() {
            config.knowledge.store_path = Some(config.outputs.data_dir.join(KNOWLEDGE_FILE));
        }

        let projects = Arc::new(ProjectPaths::open(config.outputs.data_dir.join(PROJECT_PATHS_FILE)));
        let layout = Arc::new(OutputLayout::new(config.outputs.clone(), projects));
        let skills = Arc::new(SkillLibrary::new(&config.skills.dir));
        let tools = studiobot_tools::default_registry(layout.clone(), &config.images, skills.clone());

        let history = Arc::new(match &config.chat.history_snapshot_dir {
            Some(dir) => HistoryStore::with_snapshot(config.chat.history_cap, dir),
            None => HistoryStore::new(config.chat.history_cap),
        });
        let personas = Arc::new(PersonaDirectory::from_config(&config.personas, &config.chat));
        let assembler =
            Arc::new(ContextAssembler::new(personas, tools.definitions()).with_skills(skills.clone()));
        let knowledge = Arc::new(KnowledgeBase::new(
            provider.clone(),
            config.embedding_model.clone(),
            &config.knowledge,
        ));

        let settings = OrchestratorSettings {
            default_model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_rounds: config.chat.max_tool_rounds,
            default_top_k: config.knowledge.top_k,
            ..OrchestratorSettings::default()
        };
        let orchestrator = ChatOrchestrator::new(provider, tools, history, assembler)
            .with_retriever(knowledge.clone())
            .with_settings(settings);

        info!(
            provider = %config.default_provider,
            model = %config.default_model,
            tools = orchestrator.tools().len(),
            "Services ready"
        );

        Self {
            config,
            orchestrator,
            knowledge,
            layout,
            skills,
        }
    }
}
