//! CLI argument definitions and command implementations.

pub mod profile;
pub mod token;

use clap::{Parser, Subcommand};

/// Personalizing chat backend with a per-user memory engine.
#[derive(Parser)]
#[command(name = "mnemo", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Bridge tracing spans to OpenTelemetry (stdout exporter)
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Inspect or rebuild a user's memory profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Manage mirrored auth tokens
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Print a user's memory profile
    Show {
        /// The user's id
        user_id: String,
    },

    /// Rebuild a user's profile from unprocessed messages
    Refresh {
        /// The user's id
        user_id: String,
    },
}

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Issue a new API token for a user
    Issue {
        /// The user the token authenticates as
        user_id: String,
    },
}
