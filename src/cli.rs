use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "imgaudit",
    version,
    about = "Audit carousel images: capture swipes in Chrome, decode the CDN URL, analyze and export"
)]
pub struct Cli {
    /// Data directory (default: $IMGAUDIT_DATA_DIR or the platform data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Debug-level logging
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attach to Chrome, inject the swipe detector and audit live
    Watch(WatchArgs),
    /// Run the live pipeline against an in-memory page with scripted swipes
    Simulate(SimulateArgs),
    /// Print stored entries, newest first
    List,
    /// Mark an entry QA approved
    Approve { id: String },
    /// Clear an entry's QA approval
    Unapprove { id: String },
    /// Analyze stored entries that still have no results
    Analyze {
        /// Only this entry
        id: Option<String>,
    },
    /// Write the log as CSV
    Export {
        /// Output directory (default: current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete every stored entry
    Clear,
    /// Decode one CDN image URL and print the result
    Decode { url: String },
}

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Chrome remote debugging port
    #[arg(long)]
    pub port: Option<u16>,
    /// Inspect the first page whose URL contains this text
    #[arg(long)]
    pub page: Option<String>,
    /// Analysis service base URL
    #[arg(long)]
    pub api_base: Option<String>,
    /// Persist the options above to settings.json
    #[arg(long, action = ArgAction::SetTrue)]
    pub save: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Page URL of the simulated document
    #[arg(long, default_value = "https://news.example/gallery")]
    pub url: String,
    /// Encoded slide image URL; repeat for several slides
    #[arg(long = "src")]
    pub sources: Vec<String>,
    /// Number of swipes to perform
    #[arg(long, default_value_t = 3)]
    pub swipes: usize,
    /// Skip analysis requests
    #[arg(long, action = ArgAction::SetTrue)]
    pub offline: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["imgaudit", "export", "--out", "/tmp/x", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Export { out } => assert_eq!(out, Some(PathBuf::from("/tmp/x"))),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn simulate_defaults() {
        let cli = Cli::try_parse_from(["imgaudit", "simulate"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.swipes, 3);
        assert!(args.sources.is_empty());
        assert!(!args.offline);
    }
}
