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

//! Run command - drive a recorded execution from a script

use std::{path::Path, sync::Arc, time::Duration};

use eyre::{Context, Result};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info};
use ttd_client::{
    CommandOutcome, ControlError, DebugSession, LogMessage, Recording, RecordingBackend,
};
use ttd_common::{ControlCommand, Direction};

use crate::{
    config::Config,
    script::{Script, ScriptCommand},
};

/// Failures that stop a run
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A control command did not settle in time
    #[error("protocol timeout: {command} did not settle within {after:?}")]
    ProtocolTimeout {
        /// The command that was waited for
        command: ControlCommand,
        /// How long the harness waited
        after: Duration,
    },

    /// The run issued more control commands than allowed
    #[error("step limit of {0} control commands reached")]
    StepLimit(usize),
}

struct Harness {
    session: DebugSession<RecordingBackend>,
    logs: mpsc::UnboundedReceiver<LogMessage>,
    timeout: Duration,
    max_steps: usize,
    steps: usize,
}

/// Replay `recording`, executing the script (or standard input) against it
pub async fn run_script(recording: &Path, script: Option<&Path>, config: &Config) -> Result<()> {
    let recording = Recording::load(recording)?;
    let backend = Arc::new(RecordingBackend::new(recording)?);
    let (console, logs) = mpsc::unbounded_channel();
    let session = DebugSession::new(backend, Arc::new(console));

    let mut harness = Harness {
        session,
        logs,
        timeout: config.command_timeout(),
        max_steps: config.session.max_steps,
        steps: 0,
    };
    harness.attach().await?;

    match script {
        Some(path) => {
            let script = Script::load(path)?;
            info!("Running {} script commands", script.commands.len());
            for (i, line) in script.commands.iter().enumerate() {
                harness.run_line(i + 1, line).await?;
            }
        }
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut line_no = 0;
            while let Some(line) = lines.next_line().await.wrap_err("Failed to read stdin")? {
                line_no += 1;
                harness.run_line(line_no, &line).await?;
            }
        }
    }

    debug!("Run finished after {} control commands", harness.steps);
    Ok(())
}

impl Harness {
    async fn attach(&mut self) -> Result<()> {
        self.session.attach().await?;
        self.print_pause().await;
        Ok(())
    }

    async fn run_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        let Some(command) =
            ScriptCommand::parse_line(line).with_context(|| format!("line {line_no}: {line}"))?
        else {
            return Ok(());
        };

        debug!("Executing {command:?}");
        match self.execute(command).await {
            Ok(()) => Ok(()),
            Err(e) => match e.downcast::<ControlError>() {
                // Session errors are reported and the script carries on.
                Ok(control) => {
                    println!("error: {control}");
                    Ok(())
                }
                Err(fatal) => Err(fatal),
            },
        }
    }

    async fn execute(&mut self, command: ScriptCommand) -> Result<()> {
        let session = &self.session;
        match command {
            ScriptCommand::Control(command) => self.control(command).await?,
            ScriptCommand::Break(spec) => {
                let bp = session.add_breakpoint_spec(spec).await?;
                let kind = if bp.is_logpoint() { "Logpoint" } else { "Breakpoint" };
                println!("{kind} {} set at {}", bp.id, bp.location);
            }
            ScriptCommand::Disable(location) => match session.disable_breakpoint(&location).await? {
                Some(bp) => println!("Breakpoint {} disabled", bp.id),
                None => println!("No breakpoint at {location}"),
            },
            ScriptCommand::Enable(location) => match session.enable_breakpoint(&location).await? {
                Some(bp) => println!("Breakpoint {} enabled", bp.id),
                None => println!("No breakpoint at {location}"),
            },
            ScriptCommand::Delete(location) => match session.remove_breakpoint(&location).await? {
                Some(bp) => println!("Breakpoint {} deleted", bp.id),
                None => println!("No breakpoint at {location}"),
            },
            ScriptCommand::Clear => {
                let removed = session.remove_all_breakpoints().await?;
                println!("Deleted {removed} breakpoints");
            }
            ScriptCommand::Breakpoints => {
                let breakpoints = session.breakpoints();
                if breakpoints.is_empty() {
                    println!("No breakpoints");
                }
                for bp in breakpoints {
                    println!("{bp}");
                }
            }
            ScriptCommand::Frames => {
                let snapshot = session.snapshot()?;
                let frames = snapshot.load_frames().await?;
                let selected = snapshot.selected_frame()?.map(|f| f.index);
                for frame in frames.iter() {
                    let marker = if Some(frame.index) == selected { '>' } else { ' ' };
                    println!("{marker} {frame}");
                }
            }
            ScriptCommand::Scopes(frame) => {
                let snapshot = session.snapshot()?;
                let scopes = match frame {
                    Some(index) => snapshot.scopes_for(index).await?,
                    None => snapshot.selected_scopes().await?,
                };
                for (_, scope) in scopes.chain() {
                    let bindings = scope
                        .bindings
                        .iter()
                        .map(|b| format!("{} = {}", b.name, b.value))
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("{}: {bindings}", scope.kind);
                }
            }
            ScriptCommand::Select(index) => {
                let frame = session.snapshot()?.select_frame(index).await?;
                println!("Selected {frame}");
            }
            ScriptCommand::Listeners(categories) => {
                session.set_event_listener_breakpoints(categories.clone()).await?;
                println!("Event listener breakpoints: {}", categories.join(", "));
            }
            ScriptCommand::Status => {
                let status = session.status();
                match status.point {
                    Some(point) => println!("{} {} at {point}", status.thread, status.state),
                    None => println!("{} {}", status.thread, status.state),
                }
            }
        }
        Ok(())
    }

    async fn control(&mut self, command: ControlCommand) -> Result<()> {
        if self.steps >= self.max_steps {
            return Err(HarnessError::StepLimit(self.max_steps).into());
        }
        self.steps += 1;

        let handle = self.session.issue(command)?;
        let outcome = tokio::time::timeout(self.timeout, handle.wait())
            .await
            .map_err(|_| HarnessError::ProtocolTimeout { command, after: self.timeout })?;

        self.print_logs();
        match outcome? {
            CommandOutcome::Paused(_) => self.print_pause().await,
            CommandOutcome::Running(point) => {
                let boundary = match command.direction() {
                    Direction::Forward => "end",
                    Direction::Backward => "start",
                };
                println!("Running at {point} ({boundary} of recording)");
            }
            CommandOutcome::Superseded => println!("{command} superseded"),
        }
        Ok(())
    }

    fn print_logs(&mut self) {
        while let Ok(message) = self.logs.try_recv() {
            println!("[log {}] {}", message.point, message.text);
        }
    }

    async fn print_pause(&self) {
        let Ok(snapshot) = self.session.snapshot() else {
            return;
        };
        let point = snapshot.point();
        match snapshot.load_frames().await {
            Ok(frames) => match frames.first() {
                Some(top) => println!("Paused at {point} in {} @ {}", top.function, top.location),
                None => println!("Paused at {point}"),
            },
            Err(e) => println!("Paused at {point} (frames unavailable: {e})"),
        }
    }
}
