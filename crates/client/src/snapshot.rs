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

//! Cached frames and scopes of the current pause.
//!
//! The cache holds at most one pause. Each pause gets a new generation, and
//! [`PauseSnapshot`] handles remember the generation they were created for: once
//! the thread leaves the pause every read through an old handle fails with
//! [`ControlError::StaleSnapshot`].

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, error};
use ttd_common::{ExecutionPoint, Frame, ScopeArena};

use crate::{backend::ReplayBackend, ControlError, ControlResult};

/// Data that may still be loading
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    /// Not loaded yet
    NotReady,
    /// Loaded; an empty collection is a definitive answer
    Ready(T),
}

impl<T> Loadable<T> {
    /// Whether the data is loaded
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The loaded data, if any
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NotReady => None,
        }
    }
}

type SharedLoad<T> = Arc<OnceCell<Arc<T>>>;

struct PauseData {
    point: ExecutionPoint,
    frames: Option<Arc<Vec<Frame>>>,
    frames_load: SharedLoad<Vec<Frame>>,
    selected: usize,
    scopes: HashMap<usize, SharedLoad<ScopeArena>>,
}

#[derive(Default)]
struct CacheState {
    generation: u64,
    pause: Option<PauseData>,
}

/// Holder of the current pause's frames and scopes
pub struct SnapshotCache<B> {
    backend: Arc<B>,
    state: Mutex<CacheState>,
}

impl<B: ReplayBackend> SnapshotCache<B> {
    /// Create an empty cache
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, state: Mutex::new(CacheState::default()) }
    }

    /// Generation of the most recent pause (or invalidation)
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Drop the current pause. Loads still in flight for it are discarded when
    /// they finish.
    pub(crate) fn invalidate(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(pause) = state.pause.take() {
            debug!(
                "Pause snapshot at {} invalidated (generation {})",
                pause.point, state.generation
            );
        }
        state.generation
    }

    /// Install a new pause
    pub(crate) fn populate(
        self: &Arc<Self>,
        point: ExecutionPoint,
        frames: Option<Vec<Frame>>,
    ) -> PauseSnapshot<B> {
        let mut state = self.state.lock();
        state.generation += 1;
        state.pause = Some(PauseData {
            point,
            frames: frames.map(Arc::new),
            frames_load: Arc::default(),
            selected: 0,
            scopes: HashMap::new(),
        });
        debug!("Pause snapshot at {point} populated (generation {})", state.generation);
        PauseSnapshot { cache: Arc::clone(self), generation: state.generation, point }
    }

    /// Handle to the current pause, if there is one
    pub fn current(self: &Arc<Self>) -> Option<PauseSnapshot<B>> {
        let state = self.state.lock();
        state.pause.as_ref().map(|pause| PauseSnapshot {
            cache: Arc::clone(self),
            generation: state.generation,
            point: pause.point,
        })
    }
}

/// Handle to the frames and scopes of one pause
pub struct PauseSnapshot<B> {
    cache: Arc<SnapshotCache<B>>,
    generation: u64,
    point: ExecutionPoint,
}

impl<B> Clone for PauseSnapshot<B> {
    fn clone(&self) -> Self {
        Self { cache: Arc::clone(&self.cache), generation: self.generation, point: self.point }
    }
}

impl<B> std::fmt::Debug for PauseSnapshot<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseSnapshot")
            .field("generation", &self.generation)
            .field("point", &self.point)
            .finish()
    }
}

impl<B: ReplayBackend> PauseSnapshot<B> {
    /// Generation this handle belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Point of the pause
    pub fn point(&self) -> ExecutionPoint {
        self.point
    }

    /// Whether the pause is still the current one
    pub fn is_current(&self) -> bool {
        let state = self.cache.state.lock();
        state.pause.is_some() && state.generation == self.generation
    }

    fn with_pause<T>(&self, f: impl FnOnce(&mut PauseData) -> T) -> ControlResult<T> {
        let mut guard = self.cache.state.lock();
        let state = &mut *guard;
        match state.pause.as_mut() {
            Some(pause) if state.generation == self.generation => Ok(f(pause)),
            _ => {
                error!(
                    "Read through stale pause snapshot at {} (generation {}, current {})",
                    self.point, self.generation, state.generation
                );
                Err(ControlError::StaleSnapshot { generation: self.generation })
            }
        }
    }

    /// Frames of the pause, innermost first
    pub fn frames(&self) -> ControlResult<Loadable<Arc<Vec<Frame>>>> {
        self.with_pause(|pause| match &pause.frames {
            Some(frames) => Loadable::Ready(Arc::clone(frames)),
            None => Loadable::NotReady,
        })
    }

    /// Frames of the pause, fetching them when the pause data did not carry them.
    ///
    /// Concurrent callers share a single backend request.
    pub async fn load_frames(&self) -> ControlResult<Arc<Vec<Frame>>> {
        let (ready, load) =
            self.with_pause(|pause| (pause.frames.clone(), Arc::clone(&pause.frames_load)))?;
        if let Some(frames) = ready {
            return Ok(frames);
        }

        let backend = Arc::clone(&self.cache.backend);
        let point = self.point;
        let frames = load
            .get_or_try_init(|| async move {
                debug!("Loading frames at {point}");
                backend.frames(point).await.map(Arc::new)
            })
            .await?
            .clone();

        self.with_pause(|pause| Arc::clone(pause.frames.get_or_insert(frames)))
    }

    /// Make `index` the selected frame, loading the frames first if needed
    pub async fn select_frame(&self, index: usize) -> ControlResult<Frame> {
        let frames = self.load_frames().await?;
        let frame = frames
            .get(index)
            .cloned()
            .ok_or(ControlError::InvalidFrame { index, depth: frames.len() })?;
        self.with_pause(|pause| pause.selected = index)?;
        Ok(frame)
    }

    /// The selected frame, `None` while frames are not loaded or the stack is empty
    pub fn selected_frame(&self) -> ControlResult<Option<Frame>> {
        self.with_pause(|pause| {
            pause.frames.as_ref().and_then(|frames| frames.get(pause.selected).cloned())
        })
    }

    /// Scope chain of a frame, resolved into an arena.
    ///
    /// The first caller for a frame issues the backend request; concurrent
    /// callers wait for that same request.
    pub async fn scopes_for(&self, frame: usize) -> ControlResult<Arc<ScopeArena>> {
        let frames = self.load_frames().await?;
        if frame >= frames.len() {
            return Err(ControlError::InvalidFrame { index: frame, depth: frames.len() });
        }

        let load = self.with_pause(|pause| Arc::clone(pause.scopes.entry(frame).or_default()))?;
        let backend = Arc::clone(&self.cache.backend);
        let point = self.point;
        let arena = load
            .get_or_try_init(|| async move {
                debug!("Loading scopes of frame {frame} at {point}");
                let chain = backend.scopes(point, frame).await?;
                Ok::<_, ControlError>(Arc::new(ScopeArena::from_chain(chain)))
            })
            .await?
            .clone();

        // The pause may have ended while the request was in flight.
        self.with_pause(|_| arena)
    }

    /// Scope chain of the selected frame
    pub async fn selected_scopes(&self) -> ControlResult<Arc<ScopeArena>> {
        let frames = self.load_frames().await?;
        let selected = self.with_pause(|pause| pause.selected)?;
        if frames.is_empty() {
            return Err(ControlError::InvalidFrame { index: selected, depth: 0 });
        }
        self.scopes_for(selected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loadable() {
        let empty: Loadable<Vec<u8>> = Loadable::Ready(vec![]);
        assert!(empty.is_ready());
        assert_eq!(empty.ready(), Some(vec![]));

        let pending: Loadable<Vec<u8>> = Loadable::NotReady;
        assert!(!pending.is_ready());
        assert_eq!(pending.ready(), None);
    }
}
