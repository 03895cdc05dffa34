use anyhow::{Context, Result};
use dialoguer::Input;
use owo_colors::OwoColorize;
use untisync_core::client::UntisClient;
use untisync_core::session::Credentials;

use crate::utils::create_spinner;

pub async fn run() -> Result<()> {
    println!("Enter your WebUntis account details.\n");

    let server: String = Input::new()
        .with_prompt("Server (e.g. example.webuntis.com)")
        .interact_text()?;
    let school: String = Input::new().with_prompt("School").interact_text()?;
    let username: String = Input::new().with_prompt("Username").interact_text()?;
    let password =
        rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let credentials = Credentials {
        server: server.trim().to_string(),
        school: school.trim().to_string(),
        username: username.trim().to_string(),
        password,
    };

    let spinner = create_spinner("Verifying credentials...");
    let (_, session) = UntisClient::login(&credentials).await?;
    spinner.finish_and_clear();

    credentials.save()?;

    println!(
        "{} Logged in as {} (id {}).",
        "✓".green(),
        session.user.display_name.bold(),
        session.user.id
    );
    println!("Credentials saved. Run `untisync sync` to fetch your data.");

    Ok(())
}
