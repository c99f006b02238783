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

//! Thread control state machine.
//!
//! ```text
//!  Unknown --pause event--> Paused <--------------------+
//!                            |  ^                       |
//!                   command  |  | landed / failed       |
//!                            v  |                       |
//!  Running <--boundary--- Stepping --(new command)--> Stepping
//!
//!  any state --terminated event--> Terminated
//! ```
//!
//! [`ThreadControl::issue`] moves the thread to `Stepping` before it returns and
//! runs the command on a Tokio task. Only the task holding the current
//! [`CommandToken`] may settle the thread, so a command issued while another is
//! in flight wins and the older one resolves as [`CommandOutcome::Superseded`].

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, warn};
use ttd_common::{ControlCommand, Direction, ExecutionPoint, Frame};

use crate::{
    backend::{BackendError, BackendEvent, LogMessage, Pause, ReplayBackend, SourceProvider},
    dispatcher::Dispatcher,
    BreakpointStore, CommandHandle, CommandOutcome, CommandToken, ControlError, ControlResult,
    PauseSnapshot, SnapshotCache,
};

/// Identity of a debuggee thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Execution state of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThreadState {
    /// Not attached yet
    #[default]
    Unknown,
    /// At a boundary of the recording, not paused
    Running,
    /// Paused; frames and scopes can be inspected
    Paused,
    /// A control command is in flight
    Stepping,
    /// The session ended
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stepping => "stepping",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What commands apply to, as published on the status channel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadContext {
    /// Current thread
    pub thread: ThreadId,
    /// Current state
    pub state: ThreadState,
    /// Last settled point (the pre-command point while stepping)
    pub point: Option<ExecutionPoint>,
    /// Command in flight
    pub token: Option<CommandToken>,
    /// Failure of the most recent command, cleared by the next one
    pub failure: Option<ControlError>,
}

impl ThreadContext {
    /// Whether no command is in flight
    pub fn is_settled(&self) -> bool {
        !matches!(self.state, ThreadState::Unknown | ThreadState::Stepping)
    }
}

/// The state a command reverts to when it fails
#[derive(Debug, Clone, Copy)]
struct Settled {
    state: ThreadState,
    point: ExecutionPoint,
}

struct ControlState {
    context: ThreadContext,
    settled: Option<Settled>,
    dispatcher: Dispatcher,
}

/// Where a command ended up
enum Landing {
    Paused { point: ExecutionPoint, frames: Vec<Frame>, output: Vec<LogMessage> },
    Running { point: ExecutionPoint, output: Vec<LogMessage> },
}

struct ControlInner<B> {
    backend: Arc<B>,
    breakpoints: Arc<BreakpointStore<B>>,
    snapshots: Arc<SnapshotCache<B>>,
    state: Mutex<ControlState>,
    status: watch::Sender<ThreadContext>,
}

/// Owner of the thread context and the pause snapshot cache
pub struct ThreadControl<B> {
    inner: Arc<ControlInner<B>>,
}

impl<B> Clone for ThreadControl<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B> ThreadControl<B>
where
    B: ReplayBackend + SourceProvider,
{
    /// Create the state machine for `thread`, starting in `Unknown`
    pub fn new(thread: ThreadId, backend: Arc<B>, breakpoints: Arc<BreakpointStore<B>>) -> Self {
        let context = ThreadContext { thread, ..Default::default() };
        let (status, _) = watch::channel(context.clone());
        let snapshots = Arc::new(SnapshotCache::new(Arc::clone(&backend)));
        let state =
            Mutex::new(ControlState { context, settled: None, dispatcher: Dispatcher::default() });
        Self { inner: Arc::new(ControlInner { backend, breakpoints, snapshots, state, status }) }
    }

    /// Current context
    pub fn context(&self) -> ThreadContext {
        self.inner.state.lock().context.clone()
    }

    /// Subscribe to context changes
    pub fn subscribe(&self) -> watch::Receiver<ThreadContext> {
        self.inner.status.subscribe()
    }

    /// Snapshot of the current pause
    pub fn snapshot(&self) -> ControlResult<PauseSnapshot<B>> {
        let state = self.inner.state.lock();
        let current = state.context.state;
        if current != ThreadState::Paused {
            return Err(ControlError::not_paused("inspecting the pause", current));
        }
        match self.inner.snapshots.current() {
            Some(snapshot) => Ok(snapshot),
            None => panic!("thread paused at {:?} without a pause snapshot", state.context.point),
        }
    }

    /// Apply an unsolicited backend notification
    pub fn handle_event(&self, event: BackendEvent) {
        let mut state = self.inner.state.lock();
        match event {
            BackendEvent::Paused(Pause { point, frames }) => match state.context.state {
                ThreadState::Unknown | ThreadState::Running | ThreadState::Paused => {
                    debug!("{} paused at {point}", state.context.thread);
                    self.inner.snapshots.populate(point, frames);
                    state.settled = Some(Settled { state: ThreadState::Paused, point });
                    state.context.state = ThreadState::Paused;
                    state.context.point = Some(point);
                }
                ThreadState::Stepping | ThreadState::Terminated => {
                    warn!("Ignoring pause at {point} while {}", state.context.state);
                    return;
                }
            },
            BackendEvent::Terminated => {
                if let Some(in_flight) = state.dispatcher.take() {
                    debug!("Cancelling {} ({}) on termination", in_flight.token, in_flight.command);
                    in_flight.cancel(Err(ControlError::Terminated));
                }
                self.inner.snapshots.invalidate();
                state.settled = None;
                state.context.state = ThreadState::Terminated;
                state.context.token = None;
                debug!("{} terminated", state.context.thread);
            }
        }
        self.inner.status.send_replace(state.context.clone());
    }

    /// Accept a control command for `thread`.
    ///
    /// The thread is `Stepping` when this returns. Must be called from within a
    /// Tokio runtime.
    pub fn issue(&self, thread: ThreadId, command: ControlCommand) -> ControlResult<CommandHandle> {
        let mut state = self.inner.state.lock();
        let current = state.context.thread;
        if thread != current {
            return Err(ControlError::StaleContext { requested: thread, current });
        }

        let from = match (state.context.state, state.settled) {
            (ThreadState::Unknown | ThreadState::Terminated, _) | (_, None) => {
                return Err(ControlError::not_paused(command, state.context.state));
            }
            (_, Some(settled)) => settled,
        };

        let (token, handle, completion) = state.dispatcher.accept(command);
        self.inner.snapshots.invalidate();

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.execute(from.point, command).await;
            inner.complete(token, command, from, result);
        });
        state.dispatcher.track(token, command, completion, task);

        state.context.state = ThreadState::Stepping;
        state.context.token = Some(token);
        state.context.failure = None;
        debug!("{command} accepted as {token} from {}", from.point);
        self.inner.status.send_replace(state.context.clone());
        Ok(handle)
    }
}

impl<B> ControlInner<B>
where
    B: ReplayBackend + SourceProvider,
{
    async fn execute(
        &self,
        from: ExecutionPoint,
        command: ControlCommand,
    ) -> ControlResult<Landing> {
        let failed = move |e: BackendError| ControlError::command_failed(command, e.message());

        let target = self.backend.target(from, command).await.map_err(failed)?;
        if !from.is_towards(&target.point, command.direction()) {
            return Err(ControlError::command_failed(
                command,
                format!("backend moved from {from} to {} against the command", target.point),
            ));
        }

        let (halt, output) = self.scan(from, target.point, command).await?;
        let (point, at_boundary) = match halt {
            Some(halt) => (halt, false),
            None => (target.point, target.at_boundary),
        };
        if at_boundary {
            return Ok(Landing::Running { point, output });
        }

        let frames = self.backend.frames(point).await.map_err(failed)?;
        Ok(Landing::Paused { point, frames, output })
    }

    /// Walk the breakpoint crossings between `from` and `to` in execution order.
    ///
    /// Logpoints whose condition holds render their output and never halt. Returns
    /// the point of the first breakpoint whose condition holds, with the logpoint
    /// output rendered before it. The output is held back until the command settles.
    async fn scan(
        &self,
        from: ExecutionPoint,
        to: ExecutionPoint,
        command: ControlCommand,
    ) -> ControlResult<(Option<ExecutionPoint>, Vec<LogMessage>)> {
        let mut output = Vec::new();
        if from == to {
            return Ok((None, output));
        }
        let locations = self.breakpoints.active_locations();
        if locations.is_empty() {
            return Ok((None, output));
        }

        let direction = command.direction();
        let mut crossings = self
            .backend
            .crossings(from, to, &locations)
            .await
            .map_err(|e| ControlError::command_failed(command, e.message()))?;
        if direction == Direction::Backward {
            crossings.reverse();
        }

        for crossing in crossings {
            let point = crossing.point;
            let within = point != from
                && from.is_towards(&point, direction)
                && point.is_towards(&to, direction);
            if !within {
                return Err(ControlError::command_failed(
                    command,
                    format!("crossing at {point} lies outside {from}..{to}"),
                ));
            }

            let Some(breakpoint) = self.breakpoints.get(&crossing.location) else {
                continue;
            };
            if !breakpoint.enabled {
                continue;
            }

            if !self.breakpoints.condition_holds(&breakpoint, point, &crossing.frame).await {
                continue;
            }
            if breakpoint.is_logpoint() {
                let messages =
                    self.breakpoints.render_logpoint(&breakpoint, point, &crossing.frame).await;
                output.extend(messages);
                continue;
            }
            debug!("{command} halted by breakpoint {} at {point}", breakpoint.id);
            return Ok((Some(point), output));
        }
        Ok((None, output))
    }

    fn complete(
        &self,
        token: CommandToken,
        command: ControlCommand,
        from: Settled,
        result: ControlResult<Landing>,
    ) {
        let mut state = self.state.lock();
        let Some(in_flight) = state.dispatcher.finish(token) else {
            warn!("Discarding result of superseded {command} ({token})");
            return;
        };

        let outcome = match result {
            Ok(Landing::Paused { point, frames, output }) => {
                self.breakpoints.emit(output);
                self.snapshots.populate(point, Some(frames));
                state.settled = Some(Settled { state: ThreadState::Paused, point });
                state.context.state = ThreadState::Paused;
                state.context.point = Some(point);
                Ok(CommandOutcome::Paused(point))
            }
            Ok(Landing::Running { point, output }) => {
                self.breakpoints.emit(output);
                state.settled = Some(Settled { state: ThreadState::Running, point });
                state.context.state = ThreadState::Running;
                state.context.point = Some(point);
                Ok(CommandOutcome::Running(point))
            }
            Err(e) => {
                error!(
                    "{command} ({token}) failed, reverting to {} at {}: {e}",
                    from.state, from.point
                );
                if from.state == ThreadState::Paused {
                    self.snapshots.populate(from.point, None);
                }
                state.settled = Some(from);
                state.context.state = from.state;
                state.context.point = Some(from.point);
                state.context.failure = Some(e.clone());
                Err(e)
            }
        };

        state.context.token = None;
        debug!("{token} settled: {}", state.context.state);
        self.status.send_replace(state.context.clone());
        in_flight.settle(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_states() {
        let mut context = ThreadContext::default();
        assert!(!context.is_settled());
        for (state, settled) in [
            (ThreadState::Paused, true),
            (ThreadState::Running, true),
            (ThreadState::Terminated, true),
            (ThreadState::Stepping, false),
        ] {
            context.state = state;
            assert_eq!(context.is_settled(), settled, "{state}");
        }
    }
}
