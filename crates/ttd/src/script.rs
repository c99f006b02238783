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

//! Session scripts
//!
//! A script is a TOML file holding a list of commands:
//!
//! ```toml
//! commands = [
//!     "break @a.js:3",
//!     "resume",
//!     "frames",
//!     "scopes 0",
//! ]
//! ```
//!
//! The same commands can be typed on standard input, one per line. Blank lines
//! and lines starting with `#` are skipped.

use std::{fs, path::Path, str::FromStr};

use eyre::{bail, eyre, Context, Error, Result};
use serde::{Deserialize, Serialize};
use ttd_common::{BreakpointSpec, ControlCommand, SourceLocation};

/// A script file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Commands in execution order
    pub commands: Vec<String>,
}

impl Script {
    /// Load a script from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid script: {}", path.display()))
    }
}

/// One command of a session script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    /// Issue a control command and wait for it to settle
    Control(ControlCommand),
    /// Add a breakpoint or logpoint
    Break(BreakpointSpec),
    /// Disable the breakpoint at a location
    Disable(SourceLocation),
    /// Enable the breakpoint at a location
    Enable(SourceLocation),
    /// Delete the breakpoint at a location
    Delete(SourceLocation),
    /// Delete every breakpoint
    Clear,
    /// List breakpoints
    Breakpoints,
    /// Print the stack
    Frames,
    /// Print the scope chain of a frame (the selected one by default)
    Scopes(Option<usize>),
    /// Select a frame
    Select(usize),
    /// Set the event-listener breakpoint categories
    Listeners(Vec<String>),
    /// Print the thread state
    Status,
}

impl ScriptCommand {
    /// Parse a script line, skipping blanks and comments
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        line.parse().map(Some)
    }
}

fn location(arg: &str) -> Result<SourceLocation> {
    if arg.is_empty() {
        bail!("Missing location");
    }
    arg.trim_start_matches('@').parse()
}

fn frame_index(arg: &str) -> Result<usize> {
    arg.parse().map_err(|_| eyre!("Invalid frame index '{arg}'"))
}

impl FromStr for ScriptCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (word, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        let rest = rest.trim();

        let command = match word {
            "break" | "b" => {
                let spec = format!("@{}", rest.trim_start_matches('@'));
                Self::Break(spec.parse()?)
            }
            "disable" => Self::Disable(location(rest)?),
            "enable" => Self::Enable(location(rest)?),
            "delete" | "d" => Self::Delete(location(rest)?),
            "clear" => Self::Clear,
            "breakpoints" | "bl" => Self::Breakpoints,
            "frames" | "bt" => Self::Frames,
            "scopes" if rest.is_empty() => Self::Scopes(None),
            "scopes" => Self::Scopes(Some(frame_index(rest)?)),
            "select" | "frame" => Self::Select(frame_index(rest)?),
            "listeners" => Self::Listeners(rest.split_whitespace().map(str::to_string).collect()),
            "status" => Self::Status,
            _ => {
                let control = ControlCommand::from_str(word)
                    .map_err(|_| eyre!("Unknown command '{s}'"))?;
                if !rest.is_empty() {
                    bail!("'{word}' takes no arguments");
                }
                Self::Control(control)
            }
        };
        Ok(command)
    }
}
