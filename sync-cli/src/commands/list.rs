//! List cached resources.

use anyhow::{Context, Result};

use super::Client;

/// Run the list command.
pub async fn run(client: &Client, owner: &str, json: bool) -> Result<()> {
    let resources = client
        .resources(owner)
        .await
        .context("Failed to read cache")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resources)?);
        return Ok(());
    }

    if resources.is_empty() {
        println!("No resources cached for {}", owner);
        return Ok(());
    }

    println!("{:<24} {:<24} {:<14} URL", "APP", "KEY", "STATE");
    for resource in &resources {
        println!(
            "{:<24} {:<24} {:<14} {}",
            resource.id.app_id(),
            resource.id.key(),
            resource.state.as_str(),
            resource.data.url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
