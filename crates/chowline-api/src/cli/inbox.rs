//! Inbox CLI command: render a user's sessions as the API would list them.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use chowline_types::chat::SessionSummary;
use chowline_types::directory::Principal;

use crate::state::AppState;

/// Print `username`'s inbox, most recent conversation first.
pub async fn show_inbox(state: &AppState, username: &str, json: bool) -> Result<()> {
    let sessions = state
        .chat_service
        .list_sessions(&Principal::new(username))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No conversations for '{}'.",
            style("i").blue().bold(),
            style(username).bold()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", inbox_table(&sessions));
    println!();

    Ok(())
}

fn inbox_table(sessions: &[SessionSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Peer").fg(Color::Cyan),
            Cell::new("Role").fg(Color::Cyan),
            Cell::new("Order").fg(Color::Cyan),
            Cell::new("Last message").fg(Color::Cyan),
            Cell::new("When").fg(Color::Cyan),
            Cell::new("Unread").fg(Color::Cyan),
        ]);

    for s in sessions {
        let peer = s
            .peer_name
            .clone()
            .unwrap_or_else(|| format!("#{}", s.peer_id));
        let order = match (&s.order_no, &s.order_status) {
            (Some(no), Some(status)) => format!("{no} ({status})"),
            (Some(no), None) => no.clone(),
            _ => "-".to_string(),
        };
        let when = s
            .last_message_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let unread = if s.unread_count > 0 {
            Cell::new(s.unread_count).fg(Color::Yellow)
        } else {
            Cell::new(s.unread_count)
        };

        table.add_row(vec![
            Cell::new(peer),
            Cell::new(s.peer_role),
            Cell::new(order),
            Cell::new(s.last_message.as_deref().unwrap_or("")),
            Cell::new(when),
            unread,
        ]);
    }

    table
}
