//! `lumi config`: configuration inspection.

use clap::Subcommand;
use lumi_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets redacted (default)
    Show,
    /// Print a config file with every default filled in
    Default,
    /// Print the config file location
    Path,
    /// Check that the configuration is ready for serving
    Validate,
}

pub async fn run(action: Option<ConfigAction>) -> Result<(), Box<dyn std::error::Error>> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => show(),
        ConfigAction::Default => {
            println!("{}", AppConfig::default_toml());
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", AppConfig::config_dir().join("config.toml").display());
            Ok(())
        }
        ConfigAction::Validate => validate(),
    }
}

fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("   ✅ Config parsed successfully");

    if let Err(e) = config.validate_for_serving() {
        println!("   ❌ {e}");
        return Err(e.into());
    }
    if config.auth.tokens.is_empty() {
        println!("   ⚠️  No bearer tokens configured; /api/chat will reject every request");
    }

    println!("   ✅ Ready to serve");
    println!();
    println!("   Model:     {}", config.model);
    println!("   API URL:   {}", config.api_url);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.path);
    println!("   Topics:    {}", config.topics.len());
    Ok(())
}

/// Replace the API key and bearer tokens with placeholders.
fn redacted(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    config.auth.tokens = config
        .auth
        .tokens
        .into_values()
        .enumerate()
        .map(|(i, user_id)| (format!("{REDACTED}-{i}"), user_id))
        .collect();
    config
}
