//! `mnemo token` CLI commands.
//!
//! Tokens belong to the external identity provider conceptually; this
//! command mirrors one into the local `api_tokens` table so requests can
//! be resolved to a user. The plaintext token is printed once and only
//! its hash is stored.

use uuid::Uuid;

use crate::http::extractors::auth::hash_token;
use crate::state::AppState;

/// Issue a new API token for a user and print it.
pub async fn issue_token(state: &AppState, user_id: &str, json: bool) -> anyhow::Result<()> {
    let token = format!("mnemo_{}", Uuid::new_v4().simple());
    let token_hash = hash_token(&token);

    let id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO api_tokens (id, token_hash, user_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&token_hash)
    .bind(user_id)
    .bind(&now)
    .execute(&state.db_pool.writer)
    .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "user_id": user_id,
                "token": token,
            }))?
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} Token issued for '{}' (save this -- it won't be shown again):",
        console::style("🔑").bold(),
        console::style(user_id).cyan()
    );
    println!();
    println!("  {}", console::style(&token).yellow().bold());
    println!();

    Ok(())
}
