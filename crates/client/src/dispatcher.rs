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

//! Command tokens and the single in-flight command slot.
//!
//! Every accepted command receives a fresh [`CommandToken`]. Only the holder of
//! the current token may settle the thread; accepting a new command first settles
//! the previous one as superseded and aborts its task.

use std::fmt;

use tokio::{sync::oneshot, task::JoinHandle};
use tracing::debug;
use ttd_common::{ControlCommand, ExecutionPoint};

use crate::{ControlError, ControlResult};

/// Monotonically increasing identity of an accepted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandToken(u64);

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// How an accepted command settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The thread paused at the given point
    Paused(ExecutionPoint),
    /// The command ran to the boundary of the recording without pausing
    Running(ExecutionPoint),
    /// A later command took over before this one settled
    Superseded,
}

impl CommandOutcome {
    /// The point the thread settled at, if the command was not superseded
    pub fn point(&self) -> Option<ExecutionPoint> {
        match self {
            Self::Paused(point) | Self::Running(point) => Some(*point),
            Self::Superseded => None,
        }
    }
}

type Completion = oneshot::Sender<ControlResult<CommandOutcome>>;

/// Completion future of an accepted command
#[derive(Debug)]
pub struct CommandHandle {
    token: CommandToken,
    command: ControlCommand,
    receiver: oneshot::Receiver<ControlResult<CommandOutcome>>,
}

impl CommandHandle {
    /// Token assigned to the command
    pub fn token(&self) -> CommandToken {
        self.token
    }

    /// The command this handle tracks
    pub fn command(&self) -> ControlCommand {
        self.command
    }

    /// Wait until the command settles
    pub async fn wait(self) -> ControlResult<CommandOutcome> {
        // A dropped sender means the thread control went away mid-command.
        self.receiver.await.unwrap_or(Err(ControlError::Terminated))
    }
}

/// A command accepted but not settled yet
#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) token: CommandToken,
    pub(crate) command: ControlCommand,
    completion: Completion,
    task: Option<JoinHandle<()>>,
}

impl InFlight {
    /// Deliver the final result to the handle
    pub(crate) fn settle(self, result: ControlResult<CommandOutcome>) {
        // The caller may have dropped its handle; nothing else to do then.
        let _ = self.completion.send(result);
    }

    /// Settle with `result` and stop the command's task
    pub(crate) fn cancel(mut self, result: ControlResult<CommandOutcome>) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.settle(result);
    }
}

/// Token source plus the in-flight slot of one thread
#[derive(Debug, Default)]
pub(crate) struct Dispatcher {
    last_token: u64,
    in_flight: Option<InFlight>,
}

impl Dispatcher {
    /// Accept a command: supersede whatever is in flight and hand out a token.
    ///
    /// The returned pending command must be given its task with
    /// [`Self::track`] before the state lock is released.
    pub(crate) fn accept(
        &mut self,
        command: ControlCommand,
    ) -> (CommandToken, CommandHandle, Completion) {
        if let Some(previous) = self.in_flight.take() {
            debug!("{} ({}) superseded by {command}", previous.token, previous.command);
            previous.cancel(Ok(CommandOutcome::Superseded));
        }

        self.last_token += 1;
        let token = CommandToken(self.last_token);
        let (sender, receiver) = oneshot::channel();
        (token, CommandHandle { token, command, receiver }, sender)
    }

    /// Record the task executing the accepted command
    pub(crate) fn track(
        &mut self,
        token: CommandToken,
        command: ControlCommand,
        completion: Completion,
        task: JoinHandle<()>,
    ) {
        assert!(self.in_flight.is_none(), "a command is already in flight");
        assert_eq!(token.0, self.last_token, "tracking a command that was not just accepted");
        self.in_flight = Some(InFlight { token, command, completion, task: Some(task) });
    }

    /// Token of the command in flight
    pub(crate) fn current(&self) -> Option<CommandToken> {
        self.in_flight.as_ref().map(|f| f.token)
    }

    /// Take the in-flight command if `token` is still current
    pub(crate) fn finish(&mut self, token: CommandToken) -> Option<InFlight> {
        if self.current() == Some(token) {
            self.in_flight.take()
        } else {
            None
        }
    }

    /// Take whatever is in flight
    pub(crate) fn take(&mut self) -> Option<InFlight> {
        self.in_flight.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokens_increase_and_supersede() {
        let mut dispatcher = Dispatcher::default();

        let (first, first_handle, completion) = dispatcher.accept(ControlCommand::Rewind);
        dispatcher.track(first, ControlCommand::Rewind, completion, tokio::spawn(async {}));
        assert_eq!(dispatcher.current(), Some(first));

        let (second, second_handle, completion) = dispatcher.accept(ControlCommand::Resume);
        assert!(second > first);
        assert_eq!(dispatcher.current(), None);
        dispatcher.track(second, ControlCommand::Resume, completion, tokio::spawn(async {}));

        assert_eq!(first_handle.wait().await, Ok(CommandOutcome::Superseded));
        assert!(dispatcher.finish(first).is_none());

        let in_flight = dispatcher.finish(second).unwrap();
        in_flight.settle(Ok(CommandOutcome::Paused(ExecutionPoint::new(4))));
        assert_eq!(second_handle.wait().await, Ok(CommandOutcome::Paused(ExecutionPoint::new(4))));
        assert_eq!(dispatcher.current(), None);
    }

    #[tokio::test]
    async fn test_cancel_aborts_task() {
        let mut dispatcher = Dispatcher::default();
        let (token, handle, completion) = dispatcher.accept(ControlCommand::StepIn);
        let task = tokio::spawn(std::future::pending::<()>());
        dispatcher.track(token, ControlCommand::StepIn, completion, task);

        dispatcher.take().unwrap().cancel(Err(ControlError::Terminated));
        assert_eq!(handle.wait().await, Err(ControlError::Terminated));
    }
}
