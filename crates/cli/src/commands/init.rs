//! `studiobot init`: write the default configuration.

use std::path::Path;

use studiobot_config::AppConfig;

pub fn run(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    if path.exists() && !force {
        println!("Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Created config at: {}", path.display());
    println!("\nNext steps:");
    println!("   1. Set OPENAI_API_KEY or api_key in the config");
    println!("   2. Put persona JSON files in the personas directory");
    println!("   3. Run: studiobot serve");
    Ok(())
}
