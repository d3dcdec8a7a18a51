use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use std::path::PathBuf;

use crate::api::{CrmClient, RateLimitedTransport};
use crate::config::{expand_env_reference, ApiConfig, Config};

/// Token reference written when none is entered
const DEFAULT_TOKEN_REFERENCE: &str = "${HUBSPOT_TOKEN}";

pub struct InitOptions {
    pub config_path: Option<PathBuf>,
    pub no_prompt: bool,
    pub force: bool,
}

/// Where `init` writes when no path is given
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hubtools")
        .join("config.toml")
}

/// Checks that the token can read the portal's schemas
async fn test_token(token: &str, base_url: &str) -> Result<()> {
    let transport = RateLimitedTransport::new(&ApiConfig {
        token: Some(token.to_string()),
        base_url: base_url.to_string(),
        timeout_seconds: 10,
    })?;
    CrmClient::new(transport)
        .list_schemas()
        .await
        .map_err(|e| anyhow!("token check failed: {e}"))?;
    Ok(())
}

/// Writes a starter configuration file
///
/// # Errors
///
/// Returns an error if:
/// - The file exists and `force` is not set
/// - A prompt fails
/// - The entered token is rejected by the API
/// - The file cannot be written
pub async fn initialize_config(opts: InitOptions) -> Result<()> {
    let config_path = opts.config_path.unwrap_or_else(default_config_path);

    if config_path.exists() && !opts.force {
        return Err(anyhow!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut config = Config::default();
    config.api.token = Some(DEFAULT_TOKEN_REFERENCE.to_string());

    if !opts.no_prompt {
        let theme = ColorfulTheme::default();
        println!("Initializing hubtools configuration...\n");

        let token: String = Input::with_theme(&theme)
            .with_prompt("Private app token (or ${ENV_VAR} reference)")
            .with_initial_text(DEFAULT_TOKEN_REFERENCE)
            .interact_text()?;

        let base_url: String = Input::with_theme(&theme)
            .with_prompt("API base URL")
            .with_initial_text(config.api.base_url.clone())
            .interact_text()?;

        if let Some(value) = expand_env_reference(token.clone()) {
            print!("Testing token... ");
            match test_token(&value, &base_url).await {
                Ok(()) => println!("✓ Success"),
                Err(e) => {
                    println!("✗ Failed");
                    return Err(e);
                }
            }
        } else {
            println!("{token} is not set; skipping the token check");
        }

        config.api.token = Some(token);
        config.api.base_url = base_url;

        let input_dir: String = Input::with_theme(&theme)
            .with_prompt("Folder holding <object>.csv deletion lists")
            .with_initial_text(config.paths.input_dir.display().to_string())
            .interact_text()?;
        config.paths.input_dir = PathBuf::from(input_dir);

        let output_dir: String = Input::with_theme(&theme)
            .with_prompt("Folder for exported files")
            .with_initial_text(config.paths.output_dir.display().to_string())
            .interact_text()?;
        config.paths.output_dir = PathBuf::from(output_dir);

        let chunk_size: String = Input::with_theme(&theme)
            .with_prompt("Records per extraction file")
            .with_initial_text(config.batch.chunk_size.to_string())
            .interact_text()?;
        config.batch.chunk_size = chunk_size.trim().parse()?;

        if !Confirm::with_theme(&theme)
            .with_prompt(format!("Write {}?", config_path.display()))
            .default(true)
            .interact()?
        {
            println!("Nothing written.");
            return Ok(());
        }
    }

    let toml = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, toml)?;

    println!("\nConfiguration created at: {}", config_path.display());
    Ok(())
}
