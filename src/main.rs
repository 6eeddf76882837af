mod cli;
mod simulate;

use marquee::{config, resolver, streaming};
use marquee_common::StreamHandle;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "marquee=trace,marquee_common=debug,reqwest=debug".to_string()
        } else {
            "marquee=info,marquee_common=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate {
            media_ids,
            dwell_ms,
            gap_ms,
            overlap,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let plan = simulate::Plan {
                media_ids,
                dwell: Duration::from_millis(dwell_ms),
                gap: Duration::from_millis(gap_ms),
                overlap,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(simulate::run(&config, plan))
        }
        Commands::Resolve {
            media_id,
            json,
            cached,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_media(&config, &media_id, json, cached))
        }
        Commands::Levels { url, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(list_levels(&config, &url, json))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("marquee {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn resolve_media(
    config: &config::Config,
    media_id: &str,
    json: bool,
    cached: bool,
) -> Result<()> {
    let resolver = resolver::resolver_from_config(config)?;
    let options = resolver::ResolveOptions {
        force_refresh: !cached,
    };

    tracing::debug!(resolver = resolver.name(), media_id, "Resolving");
    let stream = resolver
        .resolve(media_id, options)
        .await
        .with_context(|| format!("Failed to resolve {}", media_id))?;

    if json {
        let handle = StreamHandle::new(media_id, stream.stream_url, stream.poster_url);
        println!("{}", serde_json::to_string_pretty(&handle)?);
    } else {
        println!("Media: {}", media_id);
        println!("Stream: {}", stream.stream_url);
        println!("Poster: {}", stream.poster_url);
    }

    Ok(())
}

async fn list_levels(config: &config::Config, url: &str, json: bool) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.engine.request_timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        });

    let manifest = streaming::fetch_manifest(&client, url)
        .await
        .with_context(|| format!("Failed to load playlist {}", url))?;

    if json {
        let value = serde_json::json!({
            "kind": format!("{:?}", manifest.kind).to_lowercase(),
            "duration_secs": manifest.duration.map(|d| d.as_secs_f64()),
            "levels": manifest.levels,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Playlist: {}", url);
    println!("Type: {:?}", manifest.kind);
    if let Some(duration) = manifest.duration {
        println!("Duration: {:.1}s", duration.as_secs_f64());
    }

    println!("\nLevels: {}", manifest.levels.len());
    for (i, level) in manifest.levels.iter().enumerate() {
        print!("  [{}] {}", i, level.label());
        if let Some(bandwidth) = level.bandwidth {
            print!(" {} bps", bandwidth);
        }
        if let (Some(w), Some(h)) = (level.width, level.height) {
            print!(" {}x{}", w, h);
        }
        if let Some(ref codecs) = level.codecs {
            print!(" ({})", codecs);
        }
        println!();
        println!("      {}", level.uri);
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let preview = &config.preview;
    println!(
        "  Hover: debounce {}ms, close {}ms, cooldown {}ms",
        preview.debounce_ms, preview.close_delay_ms, preview.cooldown_ms
    );
    println!("  Max concurrent previews: {}", preview.max_concurrent);
    println!("  Recovery attempts: {}", preview.max_recovery_attempts);
    println!(
        "  Engine: {:?} (autoplay {:?})",
        config.engine.kind, config.engine.autoplay
    );
    println!("  Resolver: {:?}", config.resolver.kind);
    println!("  Media entries: {}", config.media.len());

    Ok(())
}
