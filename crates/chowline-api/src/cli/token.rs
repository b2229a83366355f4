//! API token CLI commands.

use anyhow::Result;
use console::style;

use crate::http::extractors::auth::issue_api_token;
use crate::state::AppState;

/// Issue a bearer token for `username` and print it once.
pub async fn issue_token(state: &AppState, username: &str, json: bool) -> Result<()> {
    let token = issue_api_token(&state.db_pool, username).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"username": username, "token": token})
        );
    } else {
        println!();
        println!(
            "  {} Token issued for '{}' (save this -- it won't be shown again):",
            style("🔑").bold(),
            style(username).bold()
        );
        println!();
        println!("  {}", style(&token).yellow().bold());
        println!();
    }

    Ok(())
}
