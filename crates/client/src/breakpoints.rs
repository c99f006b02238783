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

//! Breakpoint and logpoint bookkeeping.
//!
//! Identity of a breakpoint is its resolved [`Location`]: adding twice at
//! positions that snap to the same location updates one entry, and disabling keeps
//! the entry (and its id) around. Writes are serialised by an async lock held
//! across backend registration, so readers only ever see breakpoints the backend
//! has acknowledged.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use ttd_common::{
    split_template, Breakpoint, BreakpointId, BreakpointOptions, ExecutionPoint, Frame, Location,
    SourceLocation, TemplatePart,
};

use crate::{
    backend::{Console, LogMessage, ReplayBackend, SourceProvider},
    ControlResult, LocationResolver,
};

/// Shared store of breakpoints and logpoints
pub struct BreakpointStore<B> {
    backend: Arc<B>,
    resolver: Arc<LocationResolver<B>>,
    console: Arc<dyn Console>,
    entries: RwLock<BTreeMap<Location, Breakpoint>>,
    next_id: AtomicUsize,
    write_lock: Mutex<()>,
}

impl<B> BreakpointStore<B>
where
    B: ReplayBackend + SourceProvider,
{
    /// Create an empty store
    pub fn new(
        backend: Arc<B>,
        resolver: Arc<LocationResolver<B>>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            backend,
            resolver,
            console,
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicUsize::new(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Add a breakpoint, or update the options of the one already at the same
    /// resolved location.
    ///
    /// Returns once the backend has acknowledged the registration.
    pub async fn add(
        &self,
        requested: &SourceLocation,
        options: BreakpointOptions,
    ) -> ControlResult<Breakpoint> {
        let location = self.resolver.resolve(requested).await?;
        let _guard = self.write_lock.lock().await;

        let existing = self.get(&location);
        let registered = existing.as_ref().is_some_and(|bp| bp.enabled);
        let breakpoint = match existing {
            Some(mut bp) => {
                assert_eq!(bp.location, location, "breakpoint stored under a foreign location");
                bp.enabled = true;
                bp.options = options;
                bp
            }
            None => Breakpoint {
                id: BreakpointId(self.next_id.fetch_add(1, Ordering::Relaxed)),
                location: location.clone(),
                enabled: true,
                options,
            },
        };

        if !registered {
            self.backend.set_breakpoint(&location).await?;
        }
        debug!("Breakpoint set: {breakpoint}");
        self.entries.write().insert(location, breakpoint.clone());
        Ok(breakpoint)
    }

    /// Remove the breakpoint at a position. Unknown positions are a no-op.
    pub async fn remove(&self, requested: &SourceLocation) -> ControlResult<Option<Breakpoint>> {
        let location = self.resolver.resolve(requested).await?;
        let _guard = self.write_lock.lock().await;

        let existing = self.get(&location);
        let Some(existing) = existing else {
            return Ok(None);
        };
        if existing.enabled {
            self.backend.remove_breakpoint(&location).await?;
        }
        debug!("Breakpoint removed: {existing}");
        Ok(self.entries.write().remove(&location))
    }

    /// Disable the breakpoint at a position, keeping its identity
    pub async fn disable(&self, requested: &SourceLocation) -> ControlResult<Option<Breakpoint>> {
        self.set_enabled(requested, false).await
    }

    /// Re-enable a disabled breakpoint
    pub async fn enable(&self, requested: &SourceLocation) -> ControlResult<Option<Breakpoint>> {
        self.set_enabled(requested, true).await
    }

    async fn set_enabled(
        &self,
        requested: &SourceLocation,
        enabled: bool,
    ) -> ControlResult<Option<Breakpoint>> {
        let location = self.resolver.resolve(requested).await?;
        let _guard = self.write_lock.lock().await;

        let existing = self.get(&location);
        let Some(mut breakpoint) = existing else {
            return Ok(None);
        };
        if breakpoint.enabled != enabled {
            if enabled {
                self.backend.set_breakpoint(&location).await?;
            } else {
                self.backend.remove_breakpoint(&location).await?;
            }
            breakpoint.enabled = enabled;
            self.entries.write().insert(location, breakpoint.clone());
            debug!("Breakpoint updated: {breakpoint}");
        }
        Ok(Some(breakpoint))
    }

    /// Remove every breakpoint, returning how many were removed
    pub async fn remove_all(&self) -> ControlResult<usize> {
        let _guard = self.write_lock.lock().await;

        let entries = self.snapshot();
        for breakpoint in entries.iter().filter(|bp| bp.enabled) {
            self.backend.remove_breakpoint(&breakpoint.location).await?;
            self.entries.write().remove(&breakpoint.location);
        }
        let removed = entries.len();
        self.entries.write().clear();
        debug!("Removed {removed} breakpoints");
        Ok(removed)
    }

    /// Consistent copy of every breakpoint, ordered by location
    pub fn snapshot(&self) -> Vec<Breakpoint> {
        self.entries.read().values().cloned().collect()
    }

    /// Every breakpoint, ordered by id
    pub fn list(&self) -> Vec<Breakpoint> {
        let mut breakpoints = self.snapshot();
        breakpoints.sort_by_key(|bp| bp.id);
        breakpoints
    }

    /// The breakpoint at a resolved location
    pub fn get(&self, location: &Location) -> Option<Breakpoint> {
        self.entries.read().get(location).cloned()
    }

    /// Number of stored breakpoints, disabled ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Locations of enabled breakpoints and logpoints
    pub fn active_locations(&self) -> Vec<Location> {
        self.entries.read().values().filter(|bp| bp.enabled).map(|bp| bp.location.clone()).collect()
    }

    /// Render a crossed logpoint and deliver its lines to the console.
    ///
    /// Each non-empty line of the message yields one console message. Placeholders
    /// that fail to evaluate are rendered inline as `<error: ...>`.
    pub async fn evaluate_logpoint(
        &self,
        breakpoint: &Breakpoint,
        point: ExecutionPoint,
        frame: &Frame,
    ) -> Vec<String> {
        let messages = self.render_logpoint(breakpoint, point, frame).await;
        let texts = messages.iter().map(|m| m.text.clone()).collect();
        self.emit(messages);
        texts
    }

    /// Render a crossed logpoint without delivering it
    pub(crate) async fn render_logpoint(
        &self,
        breakpoint: &Breakpoint,
        point: ExecutionPoint,
        frame: &Frame,
    ) -> Vec<LogMessage> {
        let Some(message) = breakpoint.options.log_message.as_deref() else {
            return Vec::new();
        };

        let mut rendered = Vec::new();
        for line in message.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let parts = split_template(line);
            let values = join_all(parts.iter().filter_map(|part| match part {
                TemplatePart::Expr(expr) => Some(self.backend.evaluate(point, frame.index, expr)),
                TemplatePart::Text(_) => None,
            }))
            .await;

            let mut values = values.into_iter();
            let mut text = String::new();
            for part in &parts {
                match part {
                    TemplatePart::Text(t) => text.push_str(t),
                    TemplatePart::Expr(expr) => match values.next() {
                        Some(Ok(value)) => text.push_str(&render_value(&value)),
                        Some(Err(e)) => {
                            warn!("Logpoint {} failed to evaluate {expr}: {e}", breakpoint.id);
                            text.push_str(&format!("<error: {}>", e.message()));
                        }
                        None => {}
                    },
                }
            }
            rendered.push(LogMessage { text, point, origin: frame.clone() });
        }
        rendered
    }

    /// Deliver rendered logpoint messages to the console, in order
    pub(crate) fn emit(&self, messages: Vec<LogMessage>) {
        for message in messages {
            self.console.log(message);
        }
    }

    /// Whether a crossed breakpoint should halt.
    ///
    /// Breakpoints without a condition always halt. A condition that cannot be
    /// evaluated halts too, so the failure is visible at the pause.
    pub async fn condition_holds(
        &self,
        breakpoint: &Breakpoint,
        point: ExecutionPoint,
        frame: &Frame,
    ) -> bool {
        let Some(condition) = breakpoint.options.condition.as_deref() else {
            return true;
        };

        match self.backend.evaluate(point, frame.index, condition).await {
            Ok(value) => is_truthy(&value),
            Err(e) => {
                warn!("Condition of breakpoint {} failed to evaluate: {e}", breakpoint.id);
                true
            }
        }
    }
}

/// Render a value the way logpoint output shows it
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truthiness of an evaluated condition
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
