pub mod chat;
pub mod ingest;
pub mod init;
pub mod serve;
pub mod tools;

use std::path::Path;

use studiobot_config::AppConfig;

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}").into())
}
