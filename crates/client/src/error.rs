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

//! Errors surfaced by the thread-control core

use thiserror::Error;
use ttd_common::{ControlCommand, SourceLocation};

use crate::{backend::BackendError, ThreadId, ThreadState};

/// Result alias used throughout the client
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors produced while controlling a replayed thread.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    /// The requested line has no breakable column
    #[error("no breakable position at {0}")]
    UnresolvedLocation(SourceLocation),

    /// The backend failed (or misbehaved) while executing a control command
    #[error("{command} failed: {reason}")]
    CommandFailed {
        /// The command that failed
        command: ControlCommand,
        /// What went wrong
        reason: String,
    },

    /// A snapshot handle was used after the pause it describes ended
    #[error("pause snapshot of generation {generation} is no longer current")]
    StaleSnapshot {
        /// Generation the handle was created for
        generation: u64,
    },

    /// A command named a thread other than the current one
    #[error("thread {requested} is not the current thread ({current})")]
    StaleContext {
        /// Thread named by the caller
        requested: ThreadId,
        /// Thread commands currently apply to
        current: ThreadId,
    },

    /// The thread is not in a state that accepts the operation
    #[error("{operation} is not allowed while the thread is {state}")]
    NotPaused {
        /// Operation that was attempted
        operation: String,
        /// State the thread was in
        state: ThreadState,
    },

    /// The session has ended
    #[error("session terminated")]
    Terminated,

    /// A frame index outside of the current stack
    #[error("frame {index} does not exist (stack depth {depth})")]
    InvalidFrame {
        /// Requested frame index
        index: usize,
        /// Number of frames at the pause
        depth: usize,
    },

    /// A collaborator call failed outside of a control command
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ControlError {
    pub(crate) fn command_failed(command: ControlCommand, reason: impl ToString) -> Self {
        Self::CommandFailed { command, reason: reason.to_string() }
    }

    pub(crate) fn not_paused(operation: impl ToString, state: ThreadState) -> Self {
        Self::NotPaused { operation: operation.to_string(), state }
    }
}
