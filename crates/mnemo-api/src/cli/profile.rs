//! `mnemo profile` CLI commands.

use crate::state::AppState;

/// Print a user's memory profile.
pub async fn show_profile(state: &AppState, user_id: &str, json: bool) -> anyhow::Result<()> {
    let profile = state.memory_service.get(user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    let Some(profile) = profile else {
        println!();
        println!(
            "  No memory profile for '{}' yet.",
            console::style(user_id).cyan()
        );
        println!();
        return Ok(());
    };

    println!();
    println!(
        "  {} Memory profile for '{}'",
        console::style("🧠").bold(),
        console::style(user_id).cyan()
    );
    println!(
        "  {} messages processed, watermark: {}",
        profile.message_count,
        profile
            .last_processed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    if profile.facts.is_empty() {
        println!("  {}", console::style("No facts learned yet.").dim());
    } else {
        for (idx, fact) in profile.facts.iter().enumerate() {
            println!("  {:>3}. {fact}", idx + 1);
        }
    }
    println!();

    Ok(())
}

/// Rebuild a user's profile from unprocessed messages.
pub async fn refresh_profile(state: &AppState, user_id: &str, json: bool) -> anyhow::Result<()> {
    let rebuild = state
        .memory_service
        .rebuild_profile(&state.provider, user_id)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rebuild)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Profile refreshed for '{}': {} facts total ({} added)",
        console::style("✓").green(),
        console::style(user_id).cyan(),
        rebuild.profile.facts.len(),
        rebuild.facts_added
    );
    println!();

    Ok(())
}
