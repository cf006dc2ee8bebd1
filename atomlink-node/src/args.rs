//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments of the node binary.
#[derive(Parser, Debug, Clone)]
#[command(about = "atomlink sensor node")]
pub struct NodeArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl NodeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        let matches = Self::command_with_default(default_config).get_matches();
        <Self as clap::FromArgMatches>::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }

    fn command_with_default(default_config: &'static str) -> clap::Command {
        <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.default_value(default_config))
    }
}
