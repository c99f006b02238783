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

//! Coordinates inside a recorded execution

use std::{fmt, str::FromStr};

use eyre::{eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// An opaque, totally ordered coordinate identifying a moment in the recorded execution.
///
/// Points are only ever compared with each other; nothing else may be derived from the
/// inner value. Every pause reported by the backend carries exactly one point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ExecutionPoint(u64);

impl fmt::Display for ExecutionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for ExecutionPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().trim_start_matches('#');
        raw.parse::<u64>().map(Self).map_err(|e| eyre!("Invalid execution point '{s}': {e}"))
    }
}

impl ExecutionPoint {
    /// Create a point from its raw key
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Get the raw key, for transports that need to serialize it
    pub const fn key(&self) -> u64 {
        self.0
    }

    /// Whether moving from `self` to `other` respects the given direction
    pub fn is_towards(&self, other: &Self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => other >= self,
            Direction::Backward => other <= self,
        }
    }
}

/// Direction in which a control command moves through the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Towards the end of the recording
    Forward,
    /// Towards the start of the recording
    Backward,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_are_totally_ordered() {
        let a = ExecutionPoint::new(10);
        let b = ExecutionPoint::new(42);
        assert!(a < b);
        assert_eq!(a.max(b), b);
        assert_eq!(a, ExecutionPoint::new(10));
    }

    #[test]
    fn test_point_direction() {
        let a = ExecutionPoint::new(10);
        let b = ExecutionPoint::new(42);
        assert!(a.is_towards(&b, Direction::Forward));
        assert!(!a.is_towards(&b, Direction::Backward));
        assert!(b.is_towards(&a, Direction::Backward));
        // Staying in place is allowed both ways
        assert!(a.is_towards(&a, Direction::Forward));
        assert!(a.is_towards(&a, Direction::Backward));
    }

    #[test]
    fn test_point_parse_and_display() {
        let p: ExecutionPoint = "#17".parse().unwrap();
        assert_eq!(p, ExecutionPoint::new(17));
        assert_eq!(p.to_string(), "#17");
        assert_eq!("17".parse::<ExecutionPoint>().unwrap(), p);
        assert!("seventeen".parse::<ExecutionPoint>().is_err());
    }

    #[test]
    fn test_point_serde_is_transparent() {
        let p = ExecutionPoint::new(5);
        assert_eq!(serde_json::to_string(&p).unwrap(), "5");
        assert_eq!(serde_json::from_str::<ExecutionPoint>("5").unwrap(), p);
    }
}
