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

//! TTD Common - Shared functionality for TTD components
//!
//! This crate provides the value types used by the session core, the replay
//! backends and the command line front end, together with logging setup.

/// Common types: execution points, locations, breakpoints, frames and scopes
pub mod types;

/// Expression helpers shared by breakpoint conditions and logpoints
pub mod expression;
/// Logging setup and utilities for consistent logging across TTD components
pub mod logging;

pub use expression::*;
pub use types::*;
