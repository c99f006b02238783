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

//! TTD Client - thread control for time-travel debugging sessions
//!
//! This crate drives a recorded execution through a [`ReplayBackend`]: it issues
//! the six control commands, keeps track of the thread's pause state, resolves
//! and stores breakpoints and logpoints, and caches the frames and scopes of the
//! current pause.
//!
//! [`DebugSession`] is the entry point. [`RecordingBackend`] serves a recording
//! loaded from JSON and is what the `ttd` binary and the tests run against.

pub mod backend;
mod breakpoints;
mod cache;
mod dispatcher;
mod error;
pub mod recording;
mod resolver;
mod session;
mod snapshot;
mod thread;

pub use backend::{
    BackendError, BackendEvent, BackendResult, Console, Crossing, LogMessage, MemoryConsole,
    Pause, ReplayBackend, SourceProvider, Target,
};
pub use breakpoints::{is_truthy, render_value, BreakpointStore};
pub use cache::FetchCache;
pub use dispatcher::{CommandHandle, CommandOutcome, CommandToken};
pub use error::{ControlError, ControlResult};
pub use recording::{Recording, RecordingBackend};
pub use resolver::{BreakableMap, LocationResolver};
pub use session::{DebugSession, MAIN_THREAD};
pub use snapshot::{Loadable, PauseSnapshot, SnapshotCache};
pub use thread::{ThreadContext, ThreadControl, ThreadId, ThreadState};
