mod commands;
mod notify;
mod render;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "untisync")]
#[command(about = "Sync your WebUntis timetable, exams, grades and absences")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store WebUntis credentials and verify them with a login
    Auth,
    /// Fetch everything that is stale and report what changed
    Sync {
        /// Skip desktop notifications for detected changes
        #[arg(long)]
        no_notify: bool,

        /// Only sync these views (lessons, preview, exams, grades, absences)
        #[arg(short, long, value_delimiter = ',')]
        views: Vec<String>,
    },
    /// Sync and render the requested views in the terminal
    Show {
        /// Views to render (lessons, preview, exams, grades, absences)
        #[arg(short, long, value_delimiter = ',')]
        views: Vec<String>,
    },
    /// Manage the local cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete all cached data, forcing a full refetch on the next sync
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Auth => commands::auth::run().await,
        Commands::Sync { no_notify, views } => commands::sync::run(&views, no_notify).await,
        Commands::Show { views } => commands::show::run(&views).await,
        Commands::Cache {
            command: CacheCommands::Clear,
        } => commands::cache::clear(),
    }
}
