mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {:?}", path))
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./marquee.toml",
        "./config.toml",
        "~/.config/marquee/config.toml",
        "/etc/marquee/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let preview = &config.preview;
    if preview.max_concurrent == 0 {
        anyhow::bail!("preview.max_concurrent must be at least 1");
    }
    if preview.debounce_ms == 0 {
        anyhow::bail!("preview.debounce_ms must be greater than 0");
    }

    if config.resolver.kind == ResolverKind::Cdn {
        let resolver = &config.resolver;
        if resolver.api_base_url.is_none() {
            anyhow::bail!("CDN resolver requires resolver.api_base_url");
        }
        if resolver.library_id.is_none() {
            anyhow::bail!("CDN resolver requires resolver.library_id");
        }
        if resolver.cdn_base_url.is_none() {
            anyhow::bail!("CDN resolver requires resolver.cdn_base_url");
        }
        if resolver.api_key.is_empty() {
            tracing::warn!("CDN resolver has no API key; lookups will likely be rejected");
        }
    }

    let mut seen = HashSet::new();
    for entry in &config.media {
        if entry.id.trim().is_empty() {
            anyhow::bail!("Media entry '{}' has an empty id", entry.title);
        }
        if !seen.insert(entry.id.as_str()) {
            anyhow::bail!("Duplicate media id '{}'", entry.id);
        }
    }

    Ok(())
}
