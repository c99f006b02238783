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

use std::{fmt, str::FromStr};

use eyre::{bail, Error, Result};
use serde::{Deserialize, Serialize};

use crate::Direction;

/// Execution-control commands accepted by the thread control state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlCommand {
    /// Run forward to the next breakpoint or the end of the recording
    Resume,
    /// Run backward to the previous breakpoint or the start of the recording
    Rewind,
    /// Step forward to the next step at the same or a shallower stack depth
    StepOver,
    /// Step forward to the next executed step, possibly entering a call
    StepIn,
    /// Step forward until the current frame returns to its caller
    StepOut,
    /// Step backward to the previous step at the same or a shallower stack depth
    ReverseStepOver,
}

impl ControlCommand {
    /// All commands, in a stable order
    pub const ALL: [Self; 6] = [
        Self::Resume,
        Self::Rewind,
        Self::StepOver,
        Self::StepIn,
        Self::StepOut,
        Self::ReverseStepOver,
    ];

    /// Direction the command moves through the recording
    pub fn direction(&self) -> Direction {
        match self {
            Self::Rewind | Self::ReverseStepOver => Direction::Backward,
            Self::Resume | Self::StepOver | Self::StepIn | Self::StepOut => Direction::Forward,
        }
    }

    /// Whether the command runs until a breakpoint (as opposed to stepping)
    pub fn is_run(&self) -> bool {
        matches!(self, Self::Resume | Self::Rewind)
    }

    /// Protocol name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::Rewind => "rewind",
            Self::StepOver => "stepOver",
            Self::StepIn => "stepIn",
            Self::StepOut => "stepOut",
            Self::ReverseStepOver => "reverseStepOver",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlCommand {
    type Err = Error;

    /// Accepts protocol names as well as the usual debugger shorthands
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "resume" | "continue" | "c" => Self::Resume,
            "rewind" | "reverse-continue" | "rc" => Self::Rewind,
            "stepOver" | "next" | "n" => Self::StepOver,
            "stepIn" | "step" | "s" => Self::StepIn,
            "stepOut" | "finish" | "f" => Self::StepOut,
            "reverseStepOver" | "reverse-next" | "rn" => Self::ReverseStepOver,
            other => bail!("Unknown control command: {other}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_directions() {
        assert_eq!(ControlCommand::Resume.direction(), Direction::Forward);
        assert_eq!(ControlCommand::StepOut.direction(), Direction::Forward);
        assert_eq!(ControlCommand::Rewind.direction(), Direction::Backward);
        assert_eq!(ControlCommand::ReverseStepOver.direction(), Direction::Backward);
    }

    #[test]
    fn test_command_names_round_trip() {
        for cmd in ControlCommand::ALL {
            assert_eq!(cmd.name().parse::<ControlCommand>().unwrap(), cmd);
        }
        assert_eq!("finish".parse::<ControlCommand>().unwrap(), ControlCommand::StepOut);
        assert!("jump".parse::<ControlCommand>().is_err());
    }
}
