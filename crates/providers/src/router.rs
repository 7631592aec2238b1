//! Provider selection from configuration.

use std::sync::Arc;

use studiobot_config::AppConfig;
use studiobot_core::provider::Provider;
use tracing::info;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured default provider.
///
/// Every supported backend speaks the OpenAI chat-completions protocol; the
/// name only selects the base URL and key.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let name = config.default_provider.as_str();
    let section = config.providers.get(name);
    let base_url = section
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));
    let api_key = config.api_key_for(name).unwrap_or_default();

    info!(provider = %name, base_url = %base_url, "Provider selected");
    Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "mistral" => "https://api.mistral.ai/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
