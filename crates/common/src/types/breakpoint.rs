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

use std::{fmt::Display, str::FromStr};

use derive_more::Display as DeriveDisplay;
use eyre::{bail, Error, Result};
use serde::{Deserialize, Serialize};

use crate::{normalize_expression, Location, SourceLocation};

/// Stable identity of a stored breakpoint.
///
/// The id is allocated the first time a resolved location is added and survives
/// option updates and disable/enable cycles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, DeriveDisplay,
)]
#[serde(transparent)]
pub struct BreakpointId(pub usize);

/// Options attached to a breakpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BreakpointOptions {
    /// Optional condition expression that must evaluate to a truthy value for the
    /// breakpoint to halt execution.
    pub condition: Option<String>,
    /// Optional logpoint message. A breakpoint with a log message never halts; each
    /// crossing emits the message instead. `{expr}` placeholders are evaluated.
    pub log_message: Option<String>,
}

impl BreakpointOptions {
    /// Options for a conditional breakpoint
    pub fn with_condition(condition: &str) -> Self {
        Self { condition: Some(normalize_expression(condition)), log_message: None }
    }

    /// Options for a logpoint
    pub fn with_log_message(message: &str) -> Self {
        Self { condition: None, log_message: Some(message.trim().to_string()) }
    }

    /// Whether these options describe a logpoint
    pub fn is_logpoint(&self) -> bool {
        self.log_message.is_some()
    }
}

/// A breakpoint stored at a resolved location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Breakpoint {
    /// Identity of the breakpoint
    pub id: BreakpointId,
    /// Resolved location, the key of the breakpoint
    pub location: Location,
    /// Disabled breakpoints keep their identity but never trigger
    pub enabled: bool,
    /// Condition and logpoint options
    pub options: BreakpointOptions,
}

impl Breakpoint {
    /// Whether this breakpoint is a logpoint
    pub fn is_logpoint(&self) -> bool {
        self.options.is_logpoint()
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.location)?;
        if !self.enabled {
            write!(f, " (disabled)")?;
        }
        if let Some(cond) = &self.options.condition {
            write!(f, " if {cond}")?;
        }
        if let Some(msg) = &self.options.log_message {
            write!(f, " log \"{msg}\"")?;
        }
        Ok(())
    }
}

/// A breakpoint request as typed by a user, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    /// Requested location
    pub location: SourceLocation,
    /// Requested options
    pub options: BreakpointOptions,
}

impl FromStr for BreakpointSpec {
    type Err = Error;

    /// Parses a breakpoint request from a string.
    /// Format: `@<source>:<line>[:<column>] [if $<condition>] [log $<message>]`
    /// Examples:
    /// - `@a.js:10` - Breakpoint at the first breakable column of line 10
    /// - `@a.js:10:3 if $ x > 1` - Conditional breakpoint
    /// - `@a.js:12 log $ x is {x}` - Logpoint
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let Some(rest) = trimmed.strip_prefix('@') else {
            bail!("Invalid breakpoint format. Expected @<location> [if $<cond>] [log $<msg>]: {s}");
        };

        // The log message is free text, so it is split off first
        let (rest, log_message) = match rest.find(" log ") {
            Some(pos) => (&rest[..pos], Some(strip_dollar(&rest[pos + 5..])?)),
            None => (rest, None),
        };

        let (loc_str, condition) = match rest.find(" if ") {
            Some(pos) => {
                let condition = strip_dollar(&rest[pos + 4..])?;
                (&rest[..pos], Some(normalize_expression(&condition)))
            }
            None => (rest, None),
        };

        let location = SourceLocation::from_str(loc_str.trim())?;
        Ok(Self { location, options: BreakpointOptions { condition, log_message } })
    }
}

fn strip_dollar(s: &str) -> Result<String> {
    let s = s.trim();
    let Some(body) = s.strip_prefix('$') else {
        bail!("Expression does not start with $");
    };
    let body = body.trim();
    if body.is_empty() {
        bail!("Empty expression");
    }
    Ok(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_spec_location_only() {
        let spec = BreakpointSpec::from_str("@a.js:10").unwrap();
        assert_eq!(spec.location, SourceLocation::line("a.js", 10));
        assert_eq!(spec.options, BreakpointOptions::default());
    }

    #[test]
    fn test_breakpoint_spec_with_condition() {
        let spec = BreakpointSpec::from_str("@a.js:10:3 if $  x   > 1").unwrap();
        assert_eq!(spec.location, SourceLocation::column("a.js", 10, 3));
        assert_eq!(spec.options.condition.as_deref(), Some("x > 1"));
        assert!(!spec.options.is_logpoint());
    }

    #[test]
    fn test_breakpoint_spec_logpoint() {
        let spec = BreakpointSpec::from_str("@a.js:12 log $ x is {x}").unwrap();
        assert_eq!(spec.options.log_message.as_deref(), Some("x is {x}"));
        assert!(spec.options.is_logpoint());
    }

    #[test]
    fn test_breakpoint_spec_condition_and_log() {
        let spec = BreakpointSpec::from_str("  @a.js:12 if $ n == 2 log $ hit {n}  ").unwrap();
        assert_eq!(spec.options.condition.as_deref(), Some("n == 2"));
        assert_eq!(spec.options.log_message.as_deref(), Some("hit {n}"));
    }

    #[test]
    fn test_breakpoint_spec_invalid() {
        assert!(BreakpointSpec::from_str("a.js:10").is_err());
        assert!(BreakpointSpec::from_str("@a.js").is_err());
        assert!(BreakpointSpec::from_str("@a.js:10 if x > 1").is_err());
        assert!(BreakpointSpec::from_str("@a.js:10 log $").is_err());
    }

    #[test]
    fn test_breakpoint_display() {
        let bp = Breakpoint {
            id: BreakpointId(3),
            location: Location::new("a.js", 10, 3),
            enabled: false,
            options: BreakpointOptions::with_condition("x  > 1"),
        };
        assert_eq!(bp.to_string(), "3@a.js:10:3 (disabled) if x > 1");
    }
}
