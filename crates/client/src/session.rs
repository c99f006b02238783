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

//! The debug session: one explicit context tying the collaborators together.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};
use ttd_common::{
    Breakpoint, BreakpointOptions, BreakpointSpec, ControlCommand, ExecutionPoint, Location,
    Source, SourceId, SourceLocation, Symbol,
};

use crate::{
    backend::{BackendEvent, Console, ReplayBackend, SourceProvider},
    BreakpointStore, CommandHandle, ControlError, ControlResult, LocationResolver, PauseSnapshot,
    ThreadContext, ThreadControl, ThreadId, ThreadState,
};

/// Thread commands apply to unless the backend reports another one
pub const MAIN_THREAD: ThreadId = ThreadId(1);

/// A debugging session over one recording
pub struct DebugSession<B> {
    backend: Arc<B>,
    resolver: Arc<LocationResolver<B>>,
    breakpoints: Arc<BreakpointStore<B>>,
    thread: ThreadControl<B>,
    event_listeners: RwLock<Vec<String>>,
}

impl<B> DebugSession<B>
where
    B: ReplayBackend + SourceProvider,
{
    /// Create a session; call [`Self::attach`] before issuing commands
    pub fn new(backend: Arc<B>, console: Arc<dyn Console>) -> Self {
        let resolver = Arc::new(LocationResolver::new(Arc::clone(&backend)));
        let breakpoints = Arc::new(BreakpointStore::new(
            Arc::clone(&backend),
            Arc::clone(&resolver),
            console,
        ));
        let thread =
            ThreadControl::new(MAIN_THREAD, Arc::clone(&backend), Arc::clone(&breakpoints));
        Self { backend, resolver, breakpoints, thread, event_listeners: RwLock::new(Vec::new()) }
    }

    /// Attach to the recording and wait for the initial pause
    pub async fn attach(&self) -> ControlResult<ExecutionPoint> {
        let pause = self.backend.attach().await?;
        let point = pause.point;
        self.thread.handle_event(BackendEvent::Paused(pause));
        info!("Attached, paused at {point}");
        Ok(point)
    }

    /// Feed an unsolicited backend notification to the state machine
    pub fn handle_event(&self, event: BackendEvent) {
        self.thread.handle_event(event);
    }

    /// Issue a control command on the current thread
    pub fn issue(&self, command: ControlCommand) -> ControlResult<CommandHandle> {
        self.thread.issue(self.thread.context().thread, command)
    }

    /// Issue a control command on a specific thread
    pub fn issue_on(
        &self,
        thread: ThreadId,
        command: ControlCommand,
    ) -> ControlResult<CommandHandle> {
        self.thread.issue(thread, command)
    }

    /// Run forward to the next breakpoint or the end of the recording
    pub fn resume(&self) -> ControlResult<CommandHandle> {
        self.issue(ControlCommand::Resume)
    }

    /// Run backward to the previous breakpoint or the start of the recording
    pub fn rewind(&self) -> ControlResult<CommandHandle> {
        self.issue(ControlCommand::Rewind)
    }

    /// Step to the next step at the same or a shallower depth
    pub fn step_over(&self) -> ControlResult<CommandHandle> {
        self.issue(ControlCommand::StepOver)
    }

    /// Step to the next step
    pub fn step_in(&self) -> ControlResult<CommandHandle> {
        self.issue(ControlCommand::StepIn)
    }

    /// Step until the current frame returns
    pub fn step_out(&self) -> ControlResult<CommandHandle> {
        self.issue(ControlCommand::StepOut)
    }

    /// Step back to the previous step at the same or a shallower depth
    pub fn reverse_step_over(&self) -> ControlResult<CommandHandle> {
        self.issue(ControlCommand::ReverseStepOver)
    }

    /// Add a breakpoint or logpoint
    pub async fn add_breakpoint(
        &self,
        location: &SourceLocation,
        options: BreakpointOptions,
    ) -> ControlResult<Breakpoint> {
        self.breakpoints.add(location, options).await
    }

    /// Add a breakpoint parsed from `@<location> [if $<cond>] [log $<msg>]`
    pub async fn add_breakpoint_spec(&self, spec: BreakpointSpec) -> ControlResult<Breakpoint> {
        self.breakpoints.add(&spec.location, spec.options).await
    }

    /// Remove the breakpoint at a position
    pub async fn remove_breakpoint(
        &self,
        location: &SourceLocation,
    ) -> ControlResult<Option<Breakpoint>> {
        self.breakpoints.remove(location).await
    }

    /// Disable the breakpoint at a position
    pub async fn disable_breakpoint(
        &self,
        location: &SourceLocation,
    ) -> ControlResult<Option<Breakpoint>> {
        self.breakpoints.disable(location).await
    }

    /// Enable the breakpoint at a position
    pub async fn enable_breakpoint(
        &self,
        location: &SourceLocation,
    ) -> ControlResult<Option<Breakpoint>> {
        self.breakpoints.enable(location).await
    }

    /// Remove every breakpoint
    pub async fn remove_all_breakpoints(&self) -> ControlResult<usize> {
        self.breakpoints.remove_all().await
    }

    /// Every breakpoint, ordered by id
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.list()
    }

    /// The breakpoint store
    pub fn breakpoint_store(&self) -> &BreakpointStore<B> {
        &self.breakpoints
    }

    /// Resolve a requested position without adding a breakpoint
    pub async fn resolve(&self, location: &SourceLocation) -> ControlResult<Location> {
        self.resolver.resolve(location).await
    }

    /// Replace the event-listener breakpoint categories. The list is forwarded
    /// to the backend verbatim.
    pub async fn set_event_listener_breakpoints(
        &self,
        categories: Vec<String>,
    ) -> ControlResult<()> {
        self.backend.set_event_listener_breakpoints(&categories).await?;
        debug!("Event listener breakpoints: {categories:?}");
        *self.event_listeners.write() = categories;
        Ok(())
    }

    /// Event-listener breakpoint categories currently set
    pub fn event_listener_breakpoints(&self) -> Vec<String> {
        self.event_listeners.read().clone()
    }

    /// All sources of the recording
    pub async fn sources(&self) -> ControlResult<Vec<Source>> {
        self.resolver.sources().await
    }

    /// Text of a source
    pub async fn source_content(&self, source: &SourceId) -> ControlResult<Arc<str>> {
        self.resolver.content(source).await
    }

    /// Symbols declared in a source
    pub async fn symbols(&self, source: &SourceId) -> ControlResult<Vec<Symbol>> {
        self.resolver.symbols(source).await
    }

    /// Snapshot of the current pause
    pub fn snapshot(&self) -> ControlResult<PauseSnapshot<B>> {
        self.thread.snapshot()
    }

    /// Current thread context
    pub fn status(&self) -> ThreadContext {
        self.thread.context()
    }

    /// Subscribe to thread context changes
    pub fn subscribe(&self) -> watch::Receiver<ThreadContext> {
        self.thread.subscribe()
    }

    /// Wait until the thread context satisfies `predicate`
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&ThreadContext) -> bool,
    ) -> ControlResult<ThreadContext> {
        let mut receiver = self.thread.subscribe();
        let context = receiver
            .wait_for(|context| predicate(context))
            .await
            .map_err(|_| ControlError::Terminated)?;
        Ok(context.clone())
    }

    /// Wait until no command is in flight.
    ///
    /// Fails with [`ControlError::Terminated`] when the session ends instead.
    pub async fn wait_for_pause(&self) -> ControlResult<ThreadContext> {
        let context = self.wait_until(ThreadContext::is_settled).await?;
        match context.state {
            ThreadState::Terminated => Err(ControlError::Terminated),
            _ => Ok(context),
        }
    }
}
