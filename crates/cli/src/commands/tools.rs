//! `studiobot tools`: list the tool catalogue.

use std::path::Path;

use studiobot_gateway::AppState;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let state = AppState::build(config);
    let tools = state.orchestrator.tools();

    println!("Tools ({})", tools.len());
    for definition in tools.definitions() {
        println!("  {:<16} {}", definition.name, definition.description);
    }
    Ok(())
}
