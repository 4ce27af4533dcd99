//! Process-wide block state registry: assigns a stable [`StateId`] to every
//! distinct [`BlockState`] and resolves ids back to states.
//!
//! The registry is an append-only interner. Ids are assigned sequentially on
//! first sight and never reassigned or reused. It is internally synchronized,
//! so simulation, network, and persistence threads may call it without any
//! external locking; the expected access pattern is a burst of registrations
//! at startup followed by read-mostly traffic.

use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Compact identifier for a registered block state.
///
/// Ids are dense: the first registered state (conventionally the world's
/// default, e.g. air) receives id 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub u32);

/// An immutable block state value: a block name plus its variant properties.
///
/// Equality is structural. Properties are kept sorted by key so that two
/// states built with the same properties in any order compare equal and hash
/// identically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    name: String,
    properties: Vec<(String, String)>,
}

impl BlockState {
    /// Creates a state with no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Returns a copy of this state with one property added or replaced.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        match self.properties.binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
            Ok(pos) => self.properties[pos].1 = value.into(),
            Err(pos) => self.properties.insert(pos, (key, value.into())),
        }
        self
    }

    /// Returns the block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the sorted `(key, value)` property pairs.
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }
}

#[derive(Debug)]
struct RegistryInner {
    /// Dense array where `index == StateId.0`.
    states: Vec<Arc<BlockState>>,
    /// Reverse lookup: state value -> id.
    ids: FxHashMap<BlockState, StateId>,
}

/// Thread-safe, append-only mapping between [`BlockState`] values and ids.
///
/// Constructed explicitly and injected into the storage types that need it;
/// there is no ambient global registry.
#[derive(Debug)]
pub struct StateRegistry {
    inner: RwLock<RegistryInner>,
}

impl StateRegistry {
    /// Creates a registry with the given default state pre-registered as id 0.
    ///
    /// Zero-initialized packed storage then always decodes to the default.
    pub fn new(default_state: BlockState) -> Self {
        let mut ids = FxHashMap::default();
        ids.insert(default_state.clone(), StateId(0));
        Self {
            inner: RwLock::new(RegistryInner {
                states: vec![Arc::new(default_state)],
                ids,
            }),
        }
    }

    /// Returns the id for `state`, registering it on first sight.
    ///
    /// Existing ids are never reassigned: calling this twice with equal
    /// states returns the same id.
    pub fn id_of(&self, state: &BlockState) -> StateId {
        if let Some(id) = self.lookup(state) {
            return id;
        }
        let mut inner = self.write_inner();
        // A racing registration may have won between the read and the write
        // lock; re-check before appending.
        if let Some(&id) = inner.ids.get(state) {
            return id;
        }
        let id = StateId(inner.states.len() as u32);
        inner.states.push(Arc::new(state.clone()));
        inner.ids.insert(state.clone(), id);
        id
    }

    /// Resolves an id without registering anything.
    ///
    /// `None` means the id was never assigned; callers treat that as a
    /// corrupt-data signal, not a crash.
    pub fn state_of(&self, id: StateId) -> Option<Arc<BlockState>> {
        self.read_inner().states.get(id.0 as usize).cloned()
    }

    /// Returns the id for `state` if it is already registered.
    pub fn lookup(&self, state: &BlockState) -> Option<StateId> {
        self.read_inner().ids.get(state).copied()
    }

    /// Returns the number of registered states (including the default).
    ///
    /// Used to size global-addressed packed storage.
    pub fn len(&self) -> usize {
        self.read_inner().states.len()
    }

    /// Returns `true` if only the default state is registered.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Returns the default state (id 0).
    pub fn default_state(&self) -> Arc<BlockState> {
        Arc::clone(&self.read_inner().states[0])
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
