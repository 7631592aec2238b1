//! `studiobot serve`: start the HTTP gateway.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    println!("studiobot gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.default_provider, config.default_model);

    studiobot_gateway::start(config).await
}
