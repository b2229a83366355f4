//! CLI command definitions and dispatch for the `chowline` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod inbox;
pub mod token;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Merchant chat server for order conversations.
#[derive(Debug, Parser)]
#[command(name = "chowline", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the REST API and WebSocket server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Manage API tokens.
    Token {
        #[command(subcommand)]
        action: TokenCommand,
    },

    /// Show a user's chat inbox.
    Inbox {
        /// Username whose inbox to render.
        username: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Issue a new bearer token for a user (shown once).
    Issue {
        /// Username the token authenticates as.
        username: String,
    },
}
