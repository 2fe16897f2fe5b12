pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file as well as stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape job listings and append new ones to the worksheet
    Scrape(ScrapeArgs),

    /// Manage configuration profiles
    Config {
        /// Profile name to manage
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

/// Command line overrides for a scrape run
#[derive(Args, Debug, Default)]
pub struct ScrapeArgs {
    /// Configuration profile to use instead of the default one
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Search keyword; repeat for several
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,

    /// Location filter passed to the search
    #[arg(short, long)]
    pub location: Option<String>,

    /// Result pages to fetch per keyword
    #[arg(long)]
    pub pages: Option<u32>,

    /// Delay after each request in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Crawl and report without writing to the worksheet
    #[arg(long)]
    pub dry_run: bool,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scrape(args) => {
            info!("Starting job scraper");
            commands::scrape(args).await.map(|_| ())
        },
        Commands::Config { profile, list } => {
            if list {
                info!("Listing all configuration profiles");
                commands::list_profiles()
            } else if let Some(profile_name) = profile {
                info!("Managing configuration profile: {}", profile_name);
                commands::manage_profile(profile_name)
            } else {
                info!("Showing current configuration");
                commands::show_config()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_scrape_args() {
        let cli = Cli::parse_from([
            "job-scout", "scrape",
            "-k", "data engineer", "-k", "rust developer",
            "--location", "Remote", "--pages", "3", "--dry-run",
        ]);

        match cli.command {
            Commands::Scrape(args) => {
                assert_eq!(args.keywords, vec!["data engineer", "rust developer"]);
                assert_eq!(args.location.as_deref(), Some("Remote"));
                assert_eq!(args.pages, Some(3));
                assert!(args.dry_run);
            }
            _ => panic!("expected scrape command"),
        }
    }
}
