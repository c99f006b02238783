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

use derive_more::{Display, From};
use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// Stable identifier of a loaded script or file for the lifetime of a session
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a new source id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A position requested by a caller, not yet snapped to a breakable position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source the position belongs to
    pub source_id: SourceId,
    /// Line number (1-based)
    pub line: u32,
    /// Optional column (1-based)
    pub column: Option<u32>,
}

impl SourceLocation {
    /// A whole-line request
    pub fn line(source_id: impl Into<SourceId>, line: u32) -> Self {
        Self { source_id: source_id.into(), line, column: None }
    }

    /// A request with an explicit column
    pub fn column(source_id: impl Into<SourceId>, line: u32, column: u32) -> Self {
        Self { source_id: source_id.into(), line, column: Some(column) }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{column}", self.source_id, self.line),
            None => write!(f, "{}:{}", self.source_id, self.line),
        }
    }
}

impl FromStr for SourceLocation {
    type Err = Error;

    /// Parses `<source>:<line>` or `<source>:<line>:<column>`.
    ///
    /// Source ids may themselves contain colons (e.g. URLs), so the numeric
    /// components are taken from the right.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let mut parts = trimmed.rsplitn(3, ':');
        let last = parts.next().unwrap_or_default();
        let middle = parts.next();
        let first = parts.next();

        match (first, middle) {
            (Some(source), Some(line)) if line.parse::<u32>().is_ok() => {
                let line = line.parse::<u32>().map_err(|e| eyre!("Invalid line: {e}"))?;
                let column = last.parse::<u32>().map_err(|e| eyre!("Invalid column: {e}"))?;
                Self::checked(source, line, Some(column))
            }
            (Some(source), Some(middle)) => {
                // The middle part belongs to the source id (e.g. `http://host/a.js:10`)
                let line = last.parse::<u32>().map_err(|e| eyre!("Invalid line: {e}"))?;
                Self::checked(&format!("{source}:{middle}"), line, None)
            }
            (None, Some(source)) => {
                let line = last.parse::<u32>().map_err(|e| eyre!("Invalid line: {e}"))?;
                Self::checked(source, line, None)
            }
            _ => bail!("Invalid location format. Expected <source>:<line>[:<column>], got: {s}"),
        }
    }
}

impl SourceLocation {
    fn checked(source: &str, line: u32, column: Option<u32>) -> Result<Self> {
        if source.is_empty() {
            bail!("Location is missing a source id");
        }
        if line == 0 {
            bail!("Line numbers are 1-based");
        }
        Ok(Self { source_id: SourceId::new(source), line, column })
    }
}

/// A resolved position: the line and column are a confirmed breakable position.
///
/// Ordering is (source, line, column), which gives breakpoint listings a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Source the position belongs to
    pub source_id: SourceId,
    /// Line number (1-based)
    pub line: u32,
    /// Column (1-based)
    pub column: u32,
}

impl Location {
    /// Create a new resolved location
    pub fn new(source_id: impl Into<SourceId>, line: u32, column: u32) -> Self {
        Self { source_id: source_id.into(), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source_id, self.line, self.column)
    }
}

impl From<Location> for SourceLocation {
    fn from(loc: Location) -> Self {
        Self { source_id: loc.source_id, line: loc.line, column: Some(loc.column) }
    }
}

/// Metadata about a loaded script or file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Stable id of the source
    pub id: SourceId,
    /// Url or path the source was loaded from
    pub url: String,
}

/// Breakable columns on a single line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakableLine {
    /// Line number (1-based)
    pub line: u32,
    /// Breakable columns on the line, ascending
    pub columns: Vec<u32>,
}

/// A named symbol declared in a source (function, class, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Symbol name
    pub name: String,
    /// Symbol kind, as reported by the source provider
    pub kind: String,
    /// Line where the symbol is declared
    pub line: u32,
}
