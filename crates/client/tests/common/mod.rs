//! Shared fixtures: a small recorded program and a backend wrapper that can hold
//! or fail calls on demand.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use ttd_client::{
    recording::{RecordedFrame, RecordedSource, RecordedStep},
    BackendError, BackendResult, Crossing, DebugSession, MemoryConsole, Pause, Recording,
    RecordingBackend, ReplayBackend, SourceProvider, Target,
};
use ttd_common::{
    Binding, BreakableLine, ControlCommand, ExecutionPoint, Frame, Location, ScopeData, ScopeKind,
    Source, SourceId, Symbol,
};

pub const SOURCE: &str = "a.js";

const CONTENT: &str = "function add(a, b) {
  const sum = a + b;
  return sum;
}

function main() {
  let total = 0;
  for (let i = 0; i < 2; i++) {
    total = add(total, i);
    log(total);
  }
  return total;
}
";

fn scope(kind: ScopeKind, bindings: &[(&str, Value)]) -> ScopeData {
    ScopeData {
        kind,
        bindings: bindings
            .iter()
            .map(|(name, value)| Binding { name: name.to_string(), value: value.clone() })
            .collect(),
    }
}

fn main_frame(line: u32, column: u32, total: Value, i: Value) -> RecordedFrame {
    RecordedFrame {
        function: "main".to_string(),
        location: Location::new(SOURCE, line, column),
        scopes: vec![
            scope(ScopeKind::Block, &[("i", i)]),
            scope(ScopeKind::Function, &[("total", total)]),
            scope(ScopeKind::Global, &[("limit", json!(2))]),
        ],
    }
}

fn add_frame(line: u32, a: i64, b: i64, sum: Value) -> RecordedFrame {
    RecordedFrame {
        function: "add".to_string(),
        location: Location::new(SOURCE, line, 3),
        scopes: vec![
            scope(ScopeKind::Function, &[("a", json!(a)), ("b", json!(b)), ("sum", sum)]),
            scope(ScopeKind::Global, &[("limit", json!(2))]),
        ],
    }
}

fn step(point: u64, stack: Vec<RecordedFrame>) -> RecordedStep {
    RecordedStep { point: ExecutionPoint::new(point), stack }
}

/// Points of the sample recording, in execution order
pub const POINTS: [u64; 11] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110];

/// `main` looping twice over `add`:
///
/// | point | stack (innermost first) |
/// |---|---|
/// | 10 | main@7 |
/// | 20 | main@8 |
/// | 30 | main@9 (i = 0) |
/// | 40 | add@2 (b = 0), main@9 |
/// | 50 | add@3 (b = 0), main@9 |
/// | 60 | main@10 |
/// | 70 | main@9 (i = 1) |
/// | 80 | add@2 (b = 1), main@9 |
/// | 90 | add@3 (b = 1), main@9 |
/// | 100 | main@10 |
/// | 110 | main@12 |
pub fn sample_recording() -> Recording {
    let calling = |i: i64, total: i64| main_frame(9, 13, json!(total), json!(i));
    Recording {
        sources: vec![RecordedSource {
            id: SOURCE.into(),
            url: "file:///src/a.js".to_string(),
            content: CONTENT.to_string(),
            symbols: vec![
                Symbol { name: "add".to_string(), kind: "function".to_string(), line: 1 },
                Symbol { name: "main".to_string(), kind: "function".to_string(), line: 6 },
            ],
            breakable: vec![
                BreakableLine { line: 2, columns: vec![3] },
                BreakableLine { line: 3, columns: vec![3] },
                BreakableLine { line: 7, columns: vec![3] },
                BreakableLine { line: 8, columns: vec![3, 19] },
                BreakableLine { line: 9, columns: vec![5, 13] },
                BreakableLine { line: 10, columns: vec![3, 11] },
                BreakableLine { line: 12, columns: vec![3] },
            ],
        }],
        steps: vec![
            step(10, vec![main_frame(7, 3, Value::Null, Value::Null)]),
            step(20, vec![main_frame(8, 3, json!(0), Value::Null)]),
            step(30, vec![main_frame(9, 5, json!(0), json!(0))]),
            step(40, vec![add_frame(2, 0, 0, Value::Null), calling(0, 0)]),
            step(50, vec![add_frame(3, 0, 0, json!(0)), calling(0, 0)]),
            step(60, vec![main_frame(10, 3, json!(0), json!(0))]),
            step(70, vec![main_frame(9, 5, json!(0), json!(1))]),
            step(80, vec![add_frame(2, 0, 1, Value::Null), calling(1, 0)]),
            step(90, vec![add_frame(3, 0, 1, json!(1)), calling(1, 0)]),
            step(100, vec![main_frame(10, 3, json!(1), json!(1))]),
            step(110, vec![main_frame(12, 3, json!(1), Value::Null)]),
        ],
    }
}

/// Wraps a [`RecordingBackend`] so tests can keep calls in flight or make them fail
pub struct GatedBackend {
    pub inner: RecordingBackend,
    held_targets: AtomicUsize,
    target_gate: Semaphore,
    fail_target: AtomicBool,
    misdirect_target: AtomicBool,
    fail_frames: AtomicBool,
    hold_scopes: AtomicBool,
    scope_gate: Semaphore,
    pub target_calls: AtomicUsize,
    pub scope_calls: AtomicUsize,
    pub frame_calls: AtomicUsize,
}

impl GatedBackend {
    pub fn new(recording: Recording) -> Self {
        Self {
            inner: RecordingBackend::new(recording).unwrap(),
            held_targets: AtomicUsize::new(0),
            target_gate: Semaphore::new(0),
            fail_target: AtomicBool::new(false),
            misdirect_target: AtomicBool::new(false),
            fail_frames: AtomicBool::new(false),
            hold_scopes: AtomicBool::new(false),
            scope_gate: Semaphore::new(0),
            target_calls: AtomicUsize::new(0),
            scope_calls: AtomicUsize::new(0),
            frame_calls: AtomicUsize::new(0),
        }
    }

    /// Hold the next `count` target computations until released
    pub fn hold_targets(&self, count: usize) {
        self.held_targets.store(count, Ordering::SeqCst);
    }

    pub fn release_targets(&self, count: usize) {
        self.target_gate.add_permits(count);
    }

    /// Fail the next target computation
    pub fn fail_next_target(&self) {
        self.fail_target.store(true, Ordering::SeqCst);
    }

    /// Make the next target computation land at point 0, before any recorded step
    pub fn misdirect_next_target(&self) {
        self.misdirect_target.store(true, Ordering::SeqCst);
    }

    /// Fail the next frame fetch
    pub fn fail_next_frames(&self) {
        self.fail_frames.store(true, Ordering::SeqCst);
    }

    pub fn hold_scopes(&self) {
        self.hold_scopes.store(true, Ordering::SeqCst);
    }

    pub fn release_scopes(&self) {
        self.hold_scopes.store(false, Ordering::SeqCst);
        self.scope_gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

impl SourceProvider for GatedBackend {
    async fn list_sources(&self) -> BackendResult<Vec<Source>> {
        self.inner.list_sources().await
    }

    async fn content(&self, source: &SourceId) -> BackendResult<String> {
        self.inner.content(source).await
    }

    async fn symbols(&self, source: &SourceId) -> BackendResult<Vec<Symbol>> {
        self.inner.symbols(source).await
    }

    async fn breakable_lines(&self, source: &SourceId) -> BackendResult<Vec<BreakableLine>> {
        self.inner.breakable_lines(source).await
    }
}

impl ReplayBackend for GatedBackend {
    async fn attach(&self) -> BackendResult<Pause> {
        self.inner.attach().await
    }

    async fn target(&self, from: ExecutionPoint, command: ControlCommand) -> BackendResult<Target> {
        self.target_calls.fetch_add(1, Ordering::SeqCst);
        let held = self
            .held_targets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if held {
            self.target_gate.acquire().await.unwrap().forget();
        }
        if self.fail_target.swap(false, Ordering::SeqCst) {
            return Err(BackendError::new("replay process crashed"));
        }
        if self.misdirect_target.swap(false, Ordering::SeqCst) {
            return Ok(Target { point: ExecutionPoint::new(0), at_boundary: false });
        }
        self.inner.target(from, command).await
    }

    async fn crossings(
        &self,
        from: ExecutionPoint,
        to: ExecutionPoint,
        locations: &[Location],
    ) -> BackendResult<Vec<Crossing>> {
        self.inner.crossings(from, to, locations).await
    }

    async fn frames(&self, point: ExecutionPoint) -> BackendResult<Vec<Frame>> {
        self.frame_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_frames.swap(false, Ordering::SeqCst) {
            return Err(BackendError::new("frames unavailable"));
        }
        self.inner.frames(point).await
    }

    async fn scopes(&self, point: ExecutionPoint, frame: usize) -> BackendResult<Vec<ScopeData>> {
        self.scope_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_scopes.load(Ordering::SeqCst) {
            self.scope_gate.acquire().await.unwrap().forget();
        }
        self.inner.scopes(point, frame).await
    }

    async fn evaluate(
        &self,
        point: ExecutionPoint,
        frame: usize,
        expression: &str,
    ) -> BackendResult<Value> {
        self.inner.evaluate(point, frame, expression).await
    }

    async fn set_breakpoint(&self, location: &Location) -> BackendResult<()> {
        self.inner.set_breakpoint(location).await
    }

    async fn remove_breakpoint(&self, location: &Location) -> BackendResult<()> {
        self.inner.remove_breakpoint(location).await
    }

    async fn set_event_listener_breakpoints(&self, categories: &[String]) -> BackendResult<()> {
        self.inner.set_event_listener_breakpoints(categories).await
    }
}

pub struct Fixture {
    pub session: DebugSession<GatedBackend>,
    pub backend: Arc<GatedBackend>,
    pub console: Arc<MemoryConsole>,
}

/// A session over the sample recording, not attached yet
pub fn fixture() -> Fixture {
    ttd_common::logging::ensure_test_logging(None);
    let backend = Arc::new(GatedBackend::new(sample_recording()));
    let console = Arc::new(MemoryConsole::new());
    let session = DebugSession::new(Arc::clone(&backend), console.clone());
    Fixture { session, backend, console }
}

/// A session over the sample recording, paused at its first point
pub async fn attached() -> Fixture {
    let fixture = fixture();
    fixture.session.attach().await.unwrap();
    fixture
}

pub fn point(key: u64) -> ExecutionPoint {
    ExecutionPoint::new(key)
}

/// Let spawned tasks run until they block
pub async fn settle_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
