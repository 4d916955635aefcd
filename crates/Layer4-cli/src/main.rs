//! PlugKit CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use plugkit_foundation::PlugkitConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PlugKit - install and manage plugins from the terminal
#[derive(Parser, Debug)]
#[command(name = "plugkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding installed.json and plugin resources
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Plugin gallery index URL
    #[arg(long, global = true)]
    gallery_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// List installed plugins
    List,
    /// Install a plugin from a manifest or directory URL
    Install {
        /// Plugin URL (".../plugin.json" or a directory containing plugin.json)
        url: String,
    },
    /// Remove an installed plugin
    Uninstall { id: String },
    /// Re-enable a disabled plugin
    Enable { id: String },
    /// Disable a plugin without removing it
    Disable { id: String },
    /// Re-download a plugin from its install URL (all plugins if no ID given)
    Update { id: Option<String> },
    /// Show the plugin gallery
    Gallery {
        /// Filter by name or description
        #[arg(short, long)]
        search: Option<String>,

        /// Show the cached gallery without fetching
        #[arg(long)]
        offline: bool,
    },
    /// Install a plugin listed in the gallery
    GalleryInstall { name: String },
    /// List installed plugins with newer gallery versions
    Outdated,
    /// Apply the locale provided by a plugin
    UseLocale { id: String },
    /// Apply the theme provided by a plugin
    UseTheme { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = PlugkitConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        PlugkitConfig::new()
    });

    // 커맨드라인 옵션이 설정 파일/환경 변수보다 우선
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(url) = args.gallery_url {
        config.gallery_url = Some(url);
    }

    cli::run(args.command, &config).await
}
