use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "clade-explorer")]
#[command(about = "A terminal browser for the tree of life")]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Serve data from a local fixture file instead of a backend
    #[arg(long, global = true)]
    pub fixture: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Log to stderr (headless commands only)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the interactive TUI (default)
    Run {
        /// Location to open, e.g. "?node_id=...&selected_node_id=..."
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Render one frame for a location and write it as text
    Screenshot {
        /// Location to render
        #[arg(short, long, default_value = "")]
        url: String,
        /// Output file for the screenshot (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
        /// Terminal width for rendering
        #[arg(long, default_value = "120")]
        width: u16,
        /// Terminal height for rendering
        #[arg(long, default_value = "40")]
        height: u16,
    },
    /// Print search candidates for a query
    Search {
        query: String,
    },
}
