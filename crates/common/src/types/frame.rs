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

//! Frames and scopes visible while execution is paused

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Location;

/// One stack frame at a pause. Index 0 is the innermost frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Position of the frame in the stack (0 = innermost)
    pub index: usize,
    /// Name of the executing function
    pub function: String,
    /// Where the frame is currently executing
    pub location: Location,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} @ {}", self.index, self.function, self.location)
    }
}

/// Kind of lexical environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Block scope
    Block,
    /// Function scope
    Function,
    /// Closure captured from an enclosing function
    Closure,
    /// Module or script scope
    Module,
    /// Global scope
    Global,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Block => "block",
            Self::Function => "function",
            Self::Closure => "closure",
            Self::Module => "module",
            Self::Global => "global",
        };
        f.write_str(name)
    }
}

/// A single name/value binding of a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Binding name
    pub name: String,
    /// Binding value, as reported by the backend
    pub value: Value,
}

/// Scope data as reported by the backend, innermost scope first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeData {
    /// Kind of scope
    pub kind: ScopeKind,
    /// Bindings declared in this scope
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// Index of a scope inside a [`ScopeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

/// A lexical environment at a frame.
///
/// `parent` is a back-reference for navigation only; the arena owns every scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    /// Kind of scope
    pub kind: ScopeKind,
    /// Bindings declared in this scope
    pub bindings: Vec<Binding>,
    /// Enclosing scope, if any
    pub parent: Option<ScopeId>,
}

impl Scope {
    /// Look up a binding declared directly in this scope
    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.iter().find(|b| b.name == name).map(|b| &b.value)
    }
}

/// Arena holding the scope chain of one frame.
///
/// Parents always have a larger index than their children, so the chain can never
/// contain a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    /// Build an arena from backend scope data ordered innermost first
    pub fn from_chain(chain: Vec<ScopeData>) -> Self {
        let len = chain.len();
        let scopes = chain
            .into_iter()
            .enumerate()
            .map(|(i, data)| Scope {
                kind: data.kind,
                bindings: data.bindings,
                parent: (i + 1 < len).then_some(ScopeId(i + 1)),
            })
            .collect();
        Self { scopes }
    }

    /// The innermost scope, if the chain is not empty
    pub fn innermost(&self) -> Option<ScopeId> {
        (!self.scopes.is_empty()).then_some(ScopeId(0))
    }

    /// Get a scope by id
    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0)
    }

    /// Parent of a scope
    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.get(id).and_then(|s| s.parent)
    }

    /// Number of scopes in the chain
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Walk the chain from the innermost scope outwards
    pub fn chain(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        let mut next = self.innermost();
        std::iter::from_fn(move || {
            let id = next?;
            let scope = self.get(id)?;
            next = scope.parent;
            Some((id, scope))
        })
    }

    /// Resolve a name the way lexical lookup does: innermost binding wins
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.chain().find_map(|(_, scope)| scope.binding(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding(name: &str, value: Value) -> Binding {
        Binding { name: name.to_string(), value }
    }

    fn arena() -> ScopeArena {
        ScopeArena::from_chain(vec![
            ScopeData { kind: ScopeKind::Block, bindings: vec![binding("i", json!(2))] },
            ScopeData {
                kind: ScopeKind::Function,
                bindings: vec![binding("i", json!(0)), binding("n", json!(10))],
            },
            ScopeData { kind: ScopeKind::Global, bindings: vec![binding("name", json!("app"))] },
        ])
    }

    #[test]
    fn test_scope_arena_parent_links() {
        let arena = arena();
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.innermost(), Some(ScopeId(0)));
        assert_eq!(arena.parent(ScopeId(0)), Some(ScopeId(1)));
        assert_eq!(arena.parent(ScopeId(1)), Some(ScopeId(2)));
        assert_eq!(arena.parent(ScopeId(2)), None);
    }

    #[test]
    fn test_scope_arena_chain_terminates() {
        let kinds: Vec<_> = arena().chain().map(|(_, s)| s.kind).collect();
        assert_eq!(kinds, vec![ScopeKind::Block, ScopeKind::Function, ScopeKind::Global]);
    }

    #[test]
    fn test_scope_lookup_shadowing() {
        let arena = arena();
        assert_eq!(arena.lookup("i"), Some(&json!(2)));
        assert_eq!(arena.lookup("n"), Some(&json!(10)));
        assert_eq!(arena.lookup("name"), Some(&json!("app")));
        assert_eq!(arena.lookup("missing"), None);
    }

    #[test]
    fn test_empty_arena() {
        let arena = ScopeArena::from_chain(vec![]);
        assert!(arena.is_empty());
        assert_eq!(arena.innermost(), None);
        assert_eq!(arena.chain().count(), 0);
    }
}
