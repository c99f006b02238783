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

//! In-memory replay backend serving a recorded trace.
//!
//! A recording lists its sources (with breakable positions) and every executed
//! step in order. Each step carries its execution point and the stack at that
//! moment, innermost frame first, together with the frames' scope chains. The
//! stack depth of a step is the number of frames on it.
//!
//! ```json
//! {
//!   "sources": [
//!     { "id": "a.js", "url": "file:///a.js", "breakable": [{ "line": 2, "columns": [3] }] }
//!   ],
//!   "steps": [
//!     {
//!       "point": 10,
//!       "stack": [
//!         { "function": "main", "location": { "source_id": "a.js", "line": 2, "column": 3 } }
//!       ]
//!     }
//!   ]
//! }
//! ```

mod eval;

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fs,
    path::Path,
};

use eyre::{bail, ensure, Result, WrapErr};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use ttd_common::{
    BreakableLine, ControlCommand, Direction, ExecutionPoint, Frame, Location, ScopeArena,
    ScopeData, Source, SourceId, Symbol,
};

pub use eval::evaluate;

use crate::backend::{
    BackendError, BackendResult, Crossing, Pause, ReplayBackend, SourceProvider, Target,
};

/// A source captured with the recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSource {
    /// Stable id
    pub id: SourceId,
    /// Where the source was loaded from
    pub url: String,
    /// Source text
    #[serde(default)]
    pub content: String,
    /// Declared symbols
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    /// Breakable positions
    #[serde(default)]
    pub breakable: Vec<BreakableLine>,
}

/// One frame of a recorded stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Executing function
    pub function: String,
    /// Where the frame is executing
    pub location: Location,
    /// Scope chain, innermost first
    #[serde(default)]
    pub scopes: Vec<ScopeData>,
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedStep {
    /// When the step executed
    pub point: ExecutionPoint,
    /// Stack at the step, innermost first
    pub stack: Vec<RecordedFrame>,
}

/// A complete recorded execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Sources of the program
    #[serde(default)]
    pub sources: Vec<RecordedSource>,
    /// Executed steps in execution order
    pub steps: Vec<RecordedStep>,
}

impl Recording {
    /// Parse and validate a recording
    pub fn from_json(json: &str) -> Result<Self> {
        let recording: Self = serde_json::from_str(json).wrap_err("Malformed recording")?;
        recording.validate()?;
        Ok(recording)
    }

    /// Read, parse and validate a recording file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid recording {}", path.display()))
    }

    /// Check the structural rules every recording must follow
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.steps.is_empty(), "Recording has no steps");

        let mut ids = HashSet::new();
        for source in &self.sources {
            ensure!(ids.insert(&source.id), "Duplicate source {}", source.id);
        }

        for pair in self.steps.windows(2) {
            ensure!(
                pair[0].point < pair[1].point,
                "Execution points must increase: {} is followed by {}",
                pair[0].point,
                pair[1].point
            );
        }

        for step in &self.steps {
            ensure!(!step.stack.is_empty(), "Step {} has an empty stack", step.point);
            for frame in &step.stack {
                let source = &frame.location.source_id;
                if !ids.contains(source) {
                    bail!("Step {} refers to unknown source {source}", step.point);
                }
            }
        }
        Ok(())
    }

    /// First point of the recording
    pub fn first_point(&self) -> Option<ExecutionPoint> {
        self.steps.first().map(|s| s.point)
    }

    /// Last point of the recording
    pub fn last_point(&self) -> Option<ExecutionPoint> {
        self.steps.last().map(|s| s.point)
    }
}

/// Replay backend over an in-memory [`Recording`]
#[derive(Debug)]
pub struct RecordingBackend {
    recording: Recording,
    index: HashMap<ExecutionPoint, usize>,
    breakpoints: Mutex<BTreeSet<Location>>,
    event_listeners: Mutex<Vec<String>>,
}

impl RecordingBackend {
    /// Serve a validated recording
    pub fn new(recording: Recording) -> Result<Self> {
        recording.validate()?;
        let index = recording.steps.iter().enumerate().map(|(i, s)| (s.point, i)).collect();
        Ok(Self {
            recording,
            index,
            breakpoints: Mutex::new(BTreeSet::new()),
            event_listeners: Mutex::new(Vec::new()),
        })
    }

    /// The recording being served
    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Locations registered as breakpoints
    pub fn registered_breakpoints(&self) -> Vec<Location> {
        self.breakpoints.lock().iter().cloned().collect()
    }

    /// Event-listener categories last set
    pub fn event_listener_breakpoints(&self) -> Vec<String> {
        self.event_listeners.lock().clone()
    }

    fn step_index(&self, point: ExecutionPoint) -> BackendResult<usize> {
        self.index
            .get(&point)
            .copied()
            .ok_or_else(|| BackendError::new(format!("no step recorded at {point}")))
    }

    fn source(&self, id: &SourceId) -> BackendResult<&RecordedSource> {
        self.recording
            .sources
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| BackendError::new(format!("unknown source {id}")))
    }

    fn frames_at(&self, index: usize) -> Vec<Frame> {
        self.recording.steps[index]
            .stack
            .iter()
            .enumerate()
            .map(|(i, frame)| Frame {
                index: i,
                function: frame.function.clone(),
                location: frame.location.clone(),
            })
            .collect()
    }

    fn recorded_frame(&self, point: ExecutionPoint, frame: usize) -> BackendResult<&RecordedFrame> {
        let step = &self.recording.steps[self.step_index(point)?];
        step.stack.get(frame).ok_or_else(|| {
            BackendError::new(format!("frame {frame} does not exist at {point}"))
        })
    }

    /// Natural landing step of `command` issued at step `index`
    fn find_target(&self, index: usize, command: ControlCommand) -> Target {
        let steps = &self.recording.steps;
        let depth = |i: usize| steps[i].stack.len();
        let current = depth(index);
        let later = index + 1..steps.len();

        let found = match command {
            ControlCommand::Resume | ControlCommand::Rewind => None,
            ControlCommand::StepIn => later.clone().next(),
            ControlCommand::StepOver => later.clone().find(|&i| depth(i) <= current),
            ControlCommand::StepOut => later.clone().find(|&i| depth(i) < current),
            ControlCommand::ReverseStepOver => (0..index).rev().find(|&i| depth(i) <= current),
        };

        match found {
            Some(i) => Target { point: steps[i].point, at_boundary: false },
            None => {
                let boundary = match command.direction() {
                    Direction::Forward => steps.len() - 1,
                    Direction::Backward => 0,
                };
                Target { point: steps[boundary].point, at_boundary: true }
            }
        }
    }
}

impl SourceProvider for RecordingBackend {
    async fn list_sources(&self) -> BackendResult<Vec<Source>> {
        Ok(self
            .recording
            .sources
            .iter()
            .map(|s| Source { id: s.id.clone(), url: s.url.clone() })
            .collect())
    }

    async fn content(&self, source: &SourceId) -> BackendResult<String> {
        Ok(self.source(source)?.content.clone())
    }

    async fn symbols(&self, source: &SourceId) -> BackendResult<Vec<Symbol>> {
        Ok(self.source(source)?.symbols.clone())
    }

    async fn breakable_lines(&self, source: &SourceId) -> BackendResult<Vec<BreakableLine>> {
        Ok(self.source(source)?.breakable.clone())
    }
}

impl ReplayBackend for RecordingBackend {
    async fn attach(&self) -> BackendResult<Pause> {
        let first =
            self.recording.first_point().ok_or_else(|| BackendError::new("empty recording"))?;
        Ok(Pause { point: first, frames: Some(self.frames_at(0)) })
    }

    async fn target(&self, from: ExecutionPoint, command: ControlCommand) -> BackendResult<Target> {
        let target = self.find_target(self.step_index(from)?, command);
        trace!("{command} from {from} lands at {} (boundary {})", target.point, target.at_boundary);
        Ok(target)
    }

    async fn crossings(
        &self,
        from: ExecutionPoint,
        to: ExecutionPoint,
        locations: &[Location],
    ) -> BackendResult<Vec<Crossing>> {
        let wanted: HashSet<&Location> = locations.iter().collect();
        let in_range = |point: ExecutionPoint| {
            if from <= to {
                from < point && point <= to
            } else {
                to <= point && point < from
            }
        };

        Ok(self
            .recording
            .steps
            .iter()
            .filter(|step| in_range(step.point))
            .filter_map(|step| {
                let innermost = step.stack.first()?;
                wanted.contains(&innermost.location).then(|| Crossing {
                    point: step.point,
                    location: innermost.location.clone(),
                    frame: Frame {
                        index: 0,
                        function: innermost.function.clone(),
                        location: innermost.location.clone(),
                    },
                })
            })
            .collect())
    }

    async fn frames(&self, point: ExecutionPoint) -> BackendResult<Vec<Frame>> {
        Ok(self.frames_at(self.step_index(point)?))
    }

    async fn scopes(&self, point: ExecutionPoint, frame: usize) -> BackendResult<Vec<ScopeData>> {
        Ok(self.recorded_frame(point, frame)?.scopes.clone())
    }

    async fn evaluate(
        &self,
        point: ExecutionPoint,
        frame: usize,
        expression: &str,
    ) -> BackendResult<Value> {
        let scopes = ScopeArena::from_chain(self.recorded_frame(point, frame)?.scopes.clone());
        Ok(evaluate(expression, &scopes)?)
    }

    async fn set_breakpoint(&self, location: &Location) -> BackendResult<()> {
        let source = self.source(&location.source_id)?;
        let breakable = source
            .breakable
            .iter()
            .any(|l| l.line == location.line && l.columns.contains(&location.column));
        if !breakable {
            return Err(BackendError::new(format!("{location} is not a breakable position")));
        }
        debug!("Registered breakpoint at {location}");
        self.breakpoints.lock().insert(location.clone());
        Ok(())
    }

    async fn remove_breakpoint(&self, location: &Location) -> BackendResult<()> {
        debug!("Unregistered breakpoint at {location}");
        self.breakpoints.lock().remove(location);
        Ok(())
    }

    async fn set_event_listener_breakpoints(&self, categories: &[String]) -> BackendResult<()> {
        *self.event_listeners.lock() = categories.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(point: u64, stack: &[(&str, u32)]) -> RecordedStep {
        RecordedStep {
            point: ExecutionPoint::new(point),
            stack: stack
                .iter()
                .map(|(function, line)| RecordedFrame {
                    function: function.to_string(),
                    location: Location::new("a.js", *line, 1),
                    scopes: vec![],
                })
                .collect(),
        }
    }

    fn backend() -> RecordingBackend {
        let recording = Recording {
            sources: vec![RecordedSource {
                id: "a.js".into(),
                url: "file:///a.js".to_string(),
                content: String::new(),
                symbols: vec![],
                breakable: vec![BreakableLine { line: 2, columns: vec![1] }],
            }],
            steps: vec![
                step(1, &[("main", 1)]),
                step(2, &[("f", 2), ("main", 1)]),
                step(3, &[("g", 3), ("f", 2), ("main", 1)]),
                step(4, &[("f", 2), ("main", 1)]),
                step(5, &[("main", 4)]),
            ],
        };
        RecordingBackend::new(recording).unwrap()
    }

    fn target(backend: &RecordingBackend, index: usize, command: ControlCommand) -> (u64, bool) {
        let t = backend.find_target(index, command);
        (t.point.key(), t.at_boundary)
    }

    #[test]
    fn test_step_granularity() {
        let backend = backend();
        assert_eq!(target(&backend, 0, ControlCommand::StepIn), (2, false));
        assert_eq!(target(&backend, 1, ControlCommand::StepOver), (4, false));
        assert_eq!(target(&backend, 2, ControlCommand::StepOut), (4, false));
        assert_eq!(target(&backend, 1, ControlCommand::StepOut), (5, false));
        assert_eq!(target(&backend, 3, ControlCommand::ReverseStepOver), (2, false));
        assert_eq!(target(&backend, 4, ControlCommand::ReverseStepOver), (1, false));
    }

    #[test]
    fn test_boundaries() {
        let backend = backend();
        assert_eq!(target(&backend, 1, ControlCommand::Resume), (5, true));
        assert_eq!(target(&backend, 3, ControlCommand::Rewind), (1, true));
        assert_eq!(target(&backend, 4, ControlCommand::StepOver), (5, true));
        assert_eq!(target(&backend, 0, ControlCommand::ReverseStepOver), (1, true));
    }

    #[tokio::test]
    async fn test_crossings_respect_range_exclusivity() {
        let backend = backend();
        let loc = Location::new("a.js", 2, 1);

        let forward = backend
            .crossings(ExecutionPoint::new(2), ExecutionPoint::new(5), &[loc.clone()])
            .await
            .unwrap();
        assert_eq!(forward.iter().map(|c| c.point.key()).collect::<Vec<_>>(), vec![4]);

        let backward = backend
            .crossings(ExecutionPoint::new(5), ExecutionPoint::new(2), &[loc])
            .await
            .unwrap();
        assert_eq!(backward.iter().map(|c| c.point.key()).collect::<Vec<_>>(), vec![2, 4]);
    }

    #[tokio::test]
    async fn test_set_breakpoint_requires_breakable_position() {
        let backend = backend();
        assert!(backend.set_breakpoint(&Location::new("a.js", 2, 1)).await.is_ok());
        assert!(backend.set_breakpoint(&Location::new("a.js", 3, 1)).await.is_err());
        assert!(backend.set_breakpoint(&Location::new("b.js", 2, 1)).await.is_err());
        assert_eq!(backend.registered_breakpoints(), vec![Location::new("a.js", 2, 1)]);
    }

    #[test]
    fn test_validation() {
        let mut recording = backend().recording().clone();
        recording.steps.swap(0, 1);
        assert!(recording.validate().is_err());

        let json = r#"{ "sources": [], "steps": [] }"#;
        assert!(Recording::from_json(json).is_err());

        let json = r#"{
            "sources": [{ "id": "a.js", "url": "a.js" }],
            "steps": [{ "point": 7, "stack": [{ "function": "main",
                "location": { "source_id": "a.js", "line": 1, "column": 1 } }] }]
        }"#;
        let recording = Recording::from_json(json).unwrap();
        assert_eq!(recording.first_point(), Some(ExecutionPoint::new(7)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        let recording = backend().recording().clone();
        fs::write(&path, serde_json::to_string(&recording).unwrap()).unwrap();

        assert_eq!(Recording::load(&path).unwrap(), recording);
        assert!(Recording::load(dir.path().join("missing.json")).is_err());
    }
}
