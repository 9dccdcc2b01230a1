//! CLI entry point for slotpress

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "slotpress")]
#[command(version)]
#[command(about = "Markdown content pipeline with slot directives and layouts", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render all content into the public folder
    #[command(alias = "b")]
    Build,

    /// Parse, resolve and compose all content without writing anything
    Check,

    /// List content items and the layouts they resolve to
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Clean the public folder
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "slotpress=debug,info"
    } else {
        "slotpress=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let site = slotpress::Site::new(&base_dir)?;

    match cli.command {
        Commands::Build => {
            tracing::info!("Building {:?}...", site.content_dir);
            let report = site.build()?;
            if !report.failed.is_empty() {
                anyhow::bail!("{} content items failed to render", report.failed.len());
            }
            println!("Built {} pages successfully!", report.written.len());
        }

        Commands::Check => {
            let report = site.check()?;
            if !report.is_ok() {
                anyhow::bail!(
                    "{} of {} content items have errors",
                    report.errors.len(),
                    report.checked
                );
            }
            println!("Checked {} content items, no errors", report.checked);
        }

        Commands::List { json } => {
            slotpress::commands::list::run(&site, json)?;
        }

        Commands::Clean => {
            tracing::info!("Cleaning public folder...");
            site.clean()?;
            println!("Cleaned successfully!");
        }
    }

    Ok(())
}
