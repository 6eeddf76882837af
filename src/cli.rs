use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "marquee")]
#[command(author, version, about = "Hover-driven video previews for media cards")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mount preview cards and replay hover episodes against them
    Simulate {
        /// Media ids to mount (defaults to every configured media entry)
        media_ids: Vec<String>,

        /// How long the pointer rests on each card
        #[arg(long, default_value = "1500")]
        dwell_ms: u64,

        /// Pause after leaving a card
        #[arg(long, default_value = "500")]
        gap_ms: u64,

        /// Hover all cards at the same time instead of one after another
        #[arg(long)]
        overlap: bool,
    },

    /// Resolve a media id to its stream and poster URLs
    Resolve {
        /// Media id to resolve
        #[arg(required = true)]
        media_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Allow a cached answer
        #[arg(long)]
        cached: bool,
    },

    /// Fetch a playlist and list its renditions
    Levels {
        /// Playlist URL
        #[arg(required = true)]
        url: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
