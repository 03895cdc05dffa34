use anyhow::Result;
use chrono::Local;
use owo_colors::OwoColorize;
use untisync_core::cache::CacheStore;
use untisync_core::config::Config;
use untisync_core::sync::run_sync;

use crate::notify;
use crate::utils::{create_spinner, parse_views, View};

pub async fn run(views: &[String], no_notify: bool) -> Result<()> {
    let views = parse_views(views)?;
    let config = Config::load()?;
    let store = CacheStore::open()?;

    let spinner = create_spinner("Syncing with WebUntis...");
    let outcome = run_sync(&store, &config, View::selection(&views), Local::now()).await?;
    spinner.finish_and_clear();

    println!(
        "{} Synced for {}.",
        "✓".green(),
        outcome.session.user.display_name.bold()
    );

    if outcome.events.is_empty() {
        println!("No changes since the last sync.");
    } else {
        println!("\n{} change(s):", outcome.events.len());
        for event in &outcome.events {
            println!("  {} {}", event.title.yellow(), event.body);
        }
        if !no_notify {
            notify::send(&outcome.events)?;
        }
    }

    if let Some(next) = outcome.next_refresh {
        println!(
            "\nNext sync worthwhile at {}.",
            next.format("%H:%M").to_string().dimmed()
        );
    }

    Ok(())
}
