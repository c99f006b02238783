// TTD - Time-Travel Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! TTD - Time-Travel Debugger
//!
//! Command line front end: replays a recorded execution and drives it with
//! navigation commands read from a script file or standard input.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;

mod cmd;
mod config;
mod script;

use config::Config;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "ttd")]
#[command(about = "Time-Travel Debugger for recorded executions")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ~/.ttd.toml)
    #[arg(long, env = "TTD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay a recording, executing commands from a script or stdin
    Run {
        /// Recording file (JSON)
        #[arg(long)]
        recording: PathBuf,

        /// Script file (TOML); commands are read from stdin when omitted
        #[arg(long)]
        script: Option<PathBuf>,

        /// Override the configured command timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Validate a recording and print a summary
    Check {
        /// Recording file (JSON)
        #[arg(long)]
        recording: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    ttd_common::logging::init_logging("ttd", config.log_level()?, config.logging.file_logging)?;

    match cli.command {
        Commands::Run { recording, script, timeout_ms } => {
            if let Some(ms) = timeout_ms {
                config.session.command_timeout_ms = ms;
            }
            tracing::info!("Replaying {}", recording.display());
            cmd::run_script(&recording, script.as_deref(), &config).await?;
        }
        Commands::Check { recording } => cmd::check_recording(&recording)?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}
