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

//! Resolution of requested source positions to breakable locations.
//!
//! Breakable positions and source texts are fetched once per source and kept in
//! [`FetchCache`]s. A source whose provider reports no breakable positions is
//! cached as fetched-without-value so it is not asked again.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;
use ttd_common::{BreakableLine, Location, Source, SourceId, SourceLocation, Symbol};

use crate::{backend::SourceProvider, cache::FetchCache, ControlError, ControlResult};

/// Breakable columns per line of one source
pub type BreakableMap = BTreeMap<u32, Vec<u32>>;

/// Maps requested positions onto the breakable positions of a source.
#[derive(Debug)]
pub struct LocationResolver<P> {
    provider: Arc<P>,
    breakable: RwLock<FetchCache<SourceId, Arc<BreakableMap>>>,
    contents: RwLock<FetchCache<SourceId, Arc<str>>>,
}

impl<P: SourceProvider> LocationResolver<P> {
    /// Create a resolver over a source provider
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            breakable: RwLock::new(FetchCache::new()),
            contents: RwLock::new(FetchCache::new()),
        }
    }

    /// Resolve a requested position to a breakable location.
    ///
    /// Without a column the first breakable column of the line is chosen. With a
    /// column the smallest breakable column at or after it is chosen, falling back
    /// to the last breakable column of the line.
    pub async fn resolve(&self, requested: &SourceLocation) -> ControlResult<Location> {
        let Some(lines) = self.breakable_positions(&requested.source_id).await? else {
            return Err(ControlError::UnresolvedLocation(requested.clone()));
        };

        let location = snap(&lines, requested)
            .ok_or_else(|| ControlError::UnresolvedLocation(requested.clone()))?;
        debug!("Resolved {requested} to {location}");
        Ok(location)
    }

    /// Breakable positions of a source, or `None` when it has none
    pub async fn breakable_positions(
        &self,
        source: &SourceId,
    ) -> ControlResult<Option<Arc<BreakableMap>>> {
        let cached = self.breakable.read().cached(source);
        if let Some(entry) = cached {
            return Ok(entry);
        }

        debug!("Fetching breakable positions for {source}");
        let lines = self.provider.breakable_lines(source).await?;
        let map = build_map(lines);
        let entry = if map.is_empty() { None } else { Some(Arc::new(map)) };
        self.breakable.write().record(source.clone(), entry.clone());
        Ok(entry)
    }

    /// All sources of the recording
    pub async fn sources(&self) -> ControlResult<Vec<Source>> {
        Ok(self.provider.list_sources().await?)
    }

    /// Text of a source, fetched once
    pub async fn content(&self, source: &SourceId) -> ControlResult<Arc<str>> {
        let cached = self.contents.read().cached(source).flatten();
        if let Some(text) = cached {
            return Ok(text);
        }

        debug!("Fetching content of {source}");
        let text: Arc<str> = self.provider.content(source).await?.into();
        self.contents.write().record(source.clone(), Some(text.clone()));
        Ok(text)
    }

    /// Symbol table of a source
    pub async fn symbols(&self, source: &SourceId) -> ControlResult<Vec<Symbol>> {
        Ok(self.provider.symbols(source).await?)
    }
}

fn build_map(lines: Vec<BreakableLine>) -> BreakableMap {
    let mut map = BreakableMap::new();
    for BreakableLine { line, columns } in lines {
        let entry: &mut Vec<u32> = map.entry(line).or_default();
        entry.extend(columns);
    }
    map.retain(|_, columns| {
        columns.sort_unstable();
        columns.dedup();
        !columns.is_empty()
    });
    map
}

/// Apply the snapping rule to a requested position
fn snap(lines: &BreakableMap, requested: &SourceLocation) -> Option<Location> {
    let columns = lines.get(&requested.line)?;
    let column = match requested.column {
        None => *columns.first()?,
        Some(c) => match columns.iter().find(|&&col| col >= c) {
            Some(&col) => col,
            None => *columns.last()?,
        },
    };
    Some(Location::new(requested.source_id.clone(), requested.line, column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> BreakableMap {
        build_map(vec![
            BreakableLine { line: 10, columns: vec![9, 3] },
            BreakableLine { line: 12, columns: vec![] },
            BreakableLine { line: 10, columns: vec![3, 15] },
        ])
    }

    #[test]
    fn test_build_map_sorts_and_drops_empty_lines() {
        let map = lines();
        assert_eq!(map.get(&10), Some(&vec![3, 9, 15]));
        assert!(!map.contains_key(&12));
    }

    #[test]
    fn test_snap_without_column_picks_first() {
        let loc = snap(&lines(), &SourceLocation::line("a.js", 10)).unwrap();
        assert_eq!(loc, Location::new("a.js", 10, 3));
    }

    #[test]
    fn test_snap_with_column_picks_next_breakable() {
        let map = lines();
        assert_eq!(snap(&map, &SourceLocation::column("a.js", 10, 3)).unwrap().column, 3);
        assert_eq!(snap(&map, &SourceLocation::column("a.js", 10, 4)).unwrap().column, 9);
        assert_eq!(snap(&map, &SourceLocation::column("a.js", 10, 1)).unwrap().column, 3);
    }

    #[test]
    fn test_snap_past_last_column_falls_back_to_last() {
        let loc = snap(&lines(), &SourceLocation::column("a.js", 10, 40)).unwrap();
        assert_eq!(loc.column, 15);
    }

    #[test]
    fn test_snap_unbreakable_line() {
        assert!(snap(&lines(), &SourceLocation::line("a.js", 11)).is_none());
        assert!(snap(&lines(), &SourceLocation::line("a.js", 12)).is_none());
    }
}
