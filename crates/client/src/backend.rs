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

//! Collaborator interfaces the core talks to.
//!
//! The core never walks a recording itself. A [`ReplayBackend`] computes where a
//! command naturally lands and which breakpoint locations are crossed on the way,
//! a [`SourceProvider`] supplies source metadata, and a [`Console`] receives
//! logpoint output.

use std::future::Future;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use ttd_common::{
    BreakableLine, ControlCommand, ExecutionPoint, Frame, Location, ScopeData, Source, SourceId,
    Symbol,
};

/// Failure reported by a collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("backend error: {0}")]
pub struct BackendError(String);

impl BackendError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The error message
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<eyre::Report> for BackendError {
    fn from(report: eyre::Report) -> Self {
        Self(format!("{report:#}"))
    }
}

/// Result alias for collaborator calls
pub type BackendResult<T> = Result<T, BackendError>;

/// A pause reported by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Pause {
    /// Where execution is paused
    pub point: ExecutionPoint,
    /// Stack at the pause, innermost first, when the backend ships it with the pause
    pub frames: Option<Vec<Frame>>,
}

/// Unsolicited notifications from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Execution paused (initial pause after attaching, or a pause the core did not request)
    Paused(Pause),
    /// The session ended
    Terminated,
}

/// Where a command lands when no breakpoint interferes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// The natural landing point
    pub point: ExecutionPoint,
    /// Whether the landing point is the boundary of the recording in the
    /// command's direction
    pub at_boundary: bool,
}

/// A breakpoint location reached between two points
#[derive(Debug, Clone, PartialEq)]
pub struct Crossing {
    /// When the location was reached
    pub point: ExecutionPoint,
    /// The location that was reached
    pub location: Location,
    /// The innermost frame at that moment
    pub frame: Frame,
}

/// Source metadata provider.
pub trait SourceProvider: Send + Sync + 'static {
    /// List every source known to the recording
    fn list_sources(&self) -> impl Future<Output = BackendResult<Vec<Source>>> + Send;

    /// Fetch the text of a source
    fn content(&self, source: &SourceId) -> impl Future<Output = BackendResult<String>> + Send;

    /// Fetch the symbol table of a source
    fn symbols(&self, source: &SourceId) -> impl Future<Output = BackendResult<Vec<Symbol>>> + Send;

    /// Fetch the breakable positions of a source
    fn breakable_lines(
        &self,
        source: &SourceId,
    ) -> impl Future<Output = BackendResult<Vec<BreakableLine>>> + Send;
}

/// The replay engine walking the recording.
pub trait ReplayBackend: Send + Sync + 'static {
    /// Attach to the recording and report the initial pause
    fn attach(&self) -> impl Future<Output = BackendResult<Pause>> + Send;

    /// Compute where `command` lands from `from` when no breakpoint interferes
    fn target(
        &self,
        from: ExecutionPoint,
        command: ControlCommand,
    ) -> impl Future<Output = BackendResult<Target>> + Send;

    /// Every moment one of `locations` is reached between `from` (exclusive) and
    /// `to` (inclusive), in ascending point order regardless of direction.
    fn crossings(
        &self,
        from: ExecutionPoint,
        to: ExecutionPoint,
        locations: &[Location],
    ) -> impl Future<Output = BackendResult<Vec<Crossing>>> + Send;

    /// Stack at a point, innermost first
    fn frames(
        &self,
        point: ExecutionPoint,
    ) -> impl Future<Output = BackendResult<Vec<Frame>>> + Send;

    /// Scope chain of a frame at a point, innermost first
    fn scopes(
        &self,
        point: ExecutionPoint,
        frame: usize,
    ) -> impl Future<Output = BackendResult<Vec<ScopeData>>> + Send;

    /// Evaluate an expression in the context of a frame
    fn evaluate(
        &self,
        point: ExecutionPoint,
        frame: usize,
        expression: &str,
    ) -> impl Future<Output = BackendResult<Value>> + Send;

    /// Register a breakpoint location
    fn set_breakpoint(&self, location: &Location) -> impl Future<Output = BackendResult<()>> + Send;

    /// Unregister a breakpoint location
    fn remove_breakpoint(
        &self,
        location: &Location,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Replace the set of event-listener breakpoint categories
    fn set_event_listener_breakpoints(
        &self,
        categories: &[String],
    ) -> impl Future<Output = BackendResult<()>> + Send;
}

/// One line of logpoint output
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    /// Rendered text
    pub text: String,
    /// When the logpoint was crossed
    pub point: ExecutionPoint,
    /// Frame the logpoint was evaluated in
    pub origin: Frame,
}

/// Sink for logpoint output.
pub trait Console: Send + Sync + 'static {
    /// Deliver one message
    fn log(&self, message: LogMessage);
}

impl Console for mpsc::UnboundedSender<LogMessage> {
    fn log(&self, message: LogMessage) {
        if self.send(message).is_err() {
            tracing::warn!("Console receiver dropped, logpoint output lost");
        }
    }
}

/// A console that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryConsole {
    messages: Mutex<Vec<LogMessage>>,
}

impl MemoryConsole {
    /// Create an empty console
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far, in delivery order
    pub fn messages(&self) -> Vec<LogMessage> {
        self.messages.lock().clone()
    }

    /// Rendered texts received so far
    pub fn texts(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.text.clone()).collect()
    }
}

impl Console for MemoryConsole {
    fn log(&self, message: LogMessage) {
        self.messages.lock().push(message);
    }
}
