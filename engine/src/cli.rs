//! CLI interface for dealcoach
//!
//! This module provides the command-line interface using clap's derive API.
//! The CLI is a thin local driver over the service facade; a deployed
//! install would put an HTTP layer in front of the same facade instead.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dealcoach Engine
///
/// A deal-coaching conversation engine: chat turns produce coaching replies
/// while the engine keeps a rolling summary and structured deal facts, and
/// ending a call produces a summary report with action items and a
/// follow-up email.
#[derive(Parser, Debug)]
#[command(name = "dealcoach")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one chat turn to a session
    Chat {
        /// Session key
        #[arg(short, long)]
        session: String,

        /// The user message
        message: String,
    },

    /// Show a session's current state
    State {
        /// Session key
        #[arg(short, long)]
        session: String,
    },

    /// Erase a session
    Reset {
        /// Session key
        #[arg(short, long)]
        session: String,
    },

    /// End the call and run finalization
    EndCall {
        /// Session key
        #[arg(short, long)]
        session: String,
    },

    /// Poll for a session's end-of-call report
    #[command(name = "result")]
    Report {
        /// Session key
        #[arg(short, long)]
        session: String,

        /// Override the polling timeout from config, in seconds
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
    },
}
