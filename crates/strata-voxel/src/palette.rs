//! Palette-compressed state storage: a small per-section palette plus a
//! bit-packed index array.
//!
//! Entries start out as indices into a local palette and the bit width scales
//! with the number of distinct states, keeping memory usage minimal for
//! homogeneous sections. Once the local palette would stop saving space the
//! storage switches irreversibly to global addressing, where entries are
//! [`StateId`](crate::registry::StateId) values resolved through the injected
//! [`StateRegistry`].

use std::sync::Arc;

use crate::packed::PackedArray;
use crate::registry::{BlockState, StateId, StateRegistry};
use crate::snapshot::{CorruptSection, SectionSnapshot};

/// Tuning knobs for palette growth.
#[derive(Clone, Copy, Debug)]
pub struct PaletteConfig {
    /// Bit width of a freshly constructed array. Starting above 1 bit avoids
    /// repacking on the first few distinct states.
    pub min_width: u32,
    /// Maximum number of local palette entries (including the default) before
    /// the storage switches to global addressing.
    pub max_local_len: usize,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            min_width: 4,
            max_local_len: 256,
        }
    }
}

/// Addressing mode, enforced by the type: the palette only exists in local
/// mode, so global-mode code cannot accidentally read it.
#[derive(Clone, Debug)]
enum Store {
    /// Packed entries are indices into `palette`.
    Local {
        palette: Vec<Arc<BlockState>>,
        data: PackedArray,
    },
    /// Packed entries are registry ids. Entered irreversibly.
    Global { data: PackedArray },
}

/// Palette-based array of block states over a fixed number of cells.
#[derive(Clone, Debug)]
pub struct PalettedStates {
    store: Store,
    registry: Arc<StateRegistry>,
    default_state: Arc<BlockState>,
    config: PaletteConfig,
}

impl PalettedStates {
    /// Creates storage for `len` cells, all holding the registry's default
    /// state (palette index 0, zeroed words).
    pub fn new(registry: Arc<StateRegistry>, config: PaletteConfig, len: usize) -> Self {
        let default_state = registry.default_state();
        Self {
            store: Store::Local {
                palette: vec![Arc::clone(&default_state)],
                data: PackedArray::new(config.min_width, len),
            },
            registry,
            default_state,
            config,
        }
    }

    /// Returns the state stored at `index`.
    ///
    /// A packed entry that resolves to nothing (possible only for data that
    /// bypassed snapshot validation) falls back to the default state with a
    /// warning rather than panicking.
    pub fn get(&self, index: usize) -> Arc<BlockState> {
        match &self.store {
            Store::Local { palette, data } => {
                let entry = data.get(index) as usize;
                palette.get(entry).cloned().unwrap_or_else(|| {
                    tracing::warn!(entry, len = palette.len(), "packed entry outside palette");
                    Arc::clone(&self.default_state)
                })
            }
            Store::Global { data } => {
                let id = StateId(data.get(index) as u32);
                self.registry.state_of(id).unwrap_or_else(|| {
                    tracing::warn!(id = id.0, "global entry unknown to registry");
                    Arc::clone(&self.default_state)
                })
            }
        }
    }

    /// Stores `state` at `index`, growing the palette, repacking, or
    /// switching to global addressing as needed.
    ///
    /// Re-setting a cell to a state already in the palette is idempotent for
    /// the palette but still performs the packed write.
    pub fn set(&mut self, index: usize, state: &BlockState) {
        let entry = self.resolve_for_write(state);
        match &mut self.store {
            Store::Local { data, .. } | Store::Global { data } => data.set(index, entry),
        }
    }

    /// Returns the number of cells.
    pub fn len(&self) -> usize {
        match &self.store {
            Store::Local { data, .. } | Store::Global { data } => data.len(),
        }
    }

    /// Returns `true` if the array has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current bits per entry.
    pub fn width(&self) -> u32 {
        match &self.store {
            Store::Local { data, .. } | Store::Global { data } => data.width(),
        }
    }

    /// Returns the number of local palette entries, or `None` in global mode.
    pub fn palette_len(&self) -> Option<usize> {
        match &self.store {
            Store::Local { palette, .. } => Some(palette.len()),
            Store::Global { .. } => None,
        }
    }

    /// Returns `true` once the storage has switched to global addressing.
    pub fn is_global(&self) -> bool {
        matches!(self.store, Store::Global { .. })
    }

    /// Returns the default state (registry id 0).
    pub fn default_state(&self) -> &Arc<BlockState> {
        &self.default_state
    }

    /// Captures the persisted form: the palette list (empty in global mode)
    /// and the packed words.
    ///
    /// The bit width is not part of the snapshot; the reader recomputes it
    /// from the palette size (or the registry size in global mode), so the
    /// words are repacked at that implied width. The implied width can be
    /// below the live one, e.g. a freshly-created 4-bit array with a two-entry
    /// palette snapshots at 1 bit per entry.
    pub fn snapshot(&self) -> SectionSnapshot {
        match &self.store {
            Store::Local { palette, data } => SectionSnapshot {
                palette: palette.iter().map(|s| (**s).clone()).collect(),
                words: repacked_words(data, bits_for(palette.len()), palette.len() as u64),
            },
            Store::Global { data } => SectionSnapshot {
                palette: Vec::new(),
                words: repacked_words(
                    data,
                    bits_for(self.registry.len()),
                    self.registry.len() as u64,
                ),
            },
        }
    }

    /// Reconstructs storage for `len` cells from a snapshot.
    ///
    /// The width is recomputed from the palette size (or from the registry
    /// size when the palette is empty, meaning global mode); a word count
    /// inconsistent with that width, or a global entry the registry cannot
    /// resolve, is reported as [`CorruptSection`]. Palette records are
    /// interned through the registry, which keeps ids canonical across runs.
    pub fn from_snapshot(
        snapshot: SectionSnapshot,
        registry: Arc<StateRegistry>,
        config: PaletteConfig,
        len: usize,
    ) -> Result<Self, CorruptSection> {
        let default_state = registry.default_state();
        let store = if snapshot.palette.is_empty() {
            let width = bits_for(registry.len());
            let expected = PackedArray::word_count(width, len);
            if snapshot.words.len() != expected {
                return Err(CorruptSection::WordCountMismatch {
                    expected,
                    actual: snapshot.words.len(),
                });
            }
            let data = PackedArray::from_raw(width, len, snapshot.words);
            let limit = registry.len() as u64;
            for i in 0..len {
                let entry = data.get(i);
                if entry >= limit {
                    return Err(CorruptSection::UnknownStateId(entry as u32));
                }
            }
            Store::Global { data }
        } else {
            let width = bits_for(snapshot.palette.len());
            let expected = PackedArray::word_count(width, len);
            if snapshot.words.len() != expected {
                return Err(CorruptSection::WordCountMismatch {
                    expected,
                    actual: snapshot.words.len(),
                });
            }
            let palette: Vec<Arc<BlockState>> = snapshot
                .palette
                .into_iter()
                .map(|state| {
                    registry.id_of(&state);
                    Arc::new(state)
                })
                .collect();
            Store::Local {
                palette,
                data: PackedArray::from_raw(width, len, snapshot.words),
            }
        };
        Ok(Self {
            store,
            registry,
            default_state,
            config,
        })
    }

    /// Resolves the packed entry to write for `state`, mutating palette,
    /// width, and mode as required.
    fn resolve_for_write(&mut self, state: &BlockState) -> u64 {
        match &mut self.store {
            Store::Global { data } => {
                let id = u64::from(self.registry.id_of(state).0);
                // Late registrations can outgrow the width chosen at switch
                // time.
                if id > data.max_value() {
                    *data = data.resized(bits_for(self.registry.len()));
                }
                return id;
            }
            Store::Local { palette, data } => {
                if let Some(pos) = palette.iter().position(|p| p.as_ref() == state) {
                    return pos as u64;
                }
                let new_len = palette.len() + 1;
                let worthwhile =
                    new_len <= self.config.max_local_len && new_len < self.registry.len();
                if worthwhile {
                    if new_len as u64 > data.max_value() + 1 {
                        *data = data.resized(bits_for(new_len));
                    }
                    palette.push(Arc::new(state.clone()));
                    return (new_len - 1) as u64;
                }
            }
        }
        // The local palette stopped being worthwhile: register the incoming
        // state first so the global width accounts for it, then repack.
        let id = self.registry.id_of(state);
        self.switch_to_global();
        u64::from(id.0)
    }

    /// One-way switch from palette indices to registry ids.
    ///
    /// The new width never goes below the current one, so width stays
    /// monotonic for the lifetime of this instance.
    fn switch_to_global(&mut self) {
        let new_store = match &self.store {
            Store::Global { .. } => return,
            Store::Local { palette, data } => {
                let width = data.width().max(bits_for(self.registry.len()));
                let ids: Vec<u64> = palette
                    .iter()
                    .map(|s| u64::from(self.registry.id_of(s).0))
                    .collect();
                let mut global = PackedArray::new(width, data.len());
                for i in 0..data.len() {
                    let entry = data.get(i) as usize;
                    global.set(i, ids.get(entry).copied().unwrap_or(0));
                }
                Store::Global { data: global }
            }
        };
        self.store = new_store;
    }
}

/// Smallest width such that `2^width >= n`, with a floor of 1 bit.
pub(crate) fn bits_for(n: usize) -> u32 {
    if n <= 1 { 1 } else { (n - 1).ilog2() + 1 }
}

/// Words of `data` re-encoded at `new_width` bits per entry.
///
/// Entries at or above `limit` cannot be resolved by the reader and are
/// mapped to 0 (the default), mirroring the read-side fallback.
fn repacked_words(data: &PackedArray, new_width: u32, limit: u64) -> Vec<u64> {
    if new_width == data.width() {
        return data.words().to_vec();
    }
    let mut out = PackedArray::new(new_width, data.len());
    for i in 0..data.len() {
        let entry = data.get(i);
        out.set(i, if entry < limit { entry } else { 0 });
    }
    out.into_words()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Registry with the default plus `extra` distinct states, so local mode
    /// stays worthwhile during a test.
    fn test_registry(extra: usize) -> Arc<StateRegistry> {
        let registry = Arc::new(StateRegistry::new(BlockState::new("air")));
        for i in 0..extra {
            registry.id_of(&BlockState::new(format!("block_{i}")));
        }
        registry
    }

    #[test]
    fn test_bits_for() {
        assert_eq!(bits_for(0), 1);
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(3), 2);
        assert_eq!(bits_for(16), 4);
        assert_eq!(bits_for(17), 5);
        assert_eq!(bits_for(257), 9);
    }

    #[test]
    fn test_fresh_storage_reads_default_everywhere() {
        let states = PalettedStates::new(test_registry(100), PaletteConfig::default(), 4096);
        assert_eq!(states.width(), 4);
        assert_eq!(states.palette_len(), Some(1));
        for i in [0, 1, 2047, 4095] {
            assert_eq!(states.get(i).name(), "air");
        }
    }

    #[test]
    fn test_set_then_get() {
        let mut states = PalettedStates::new(test_registry(100), PaletteConfig::default(), 4096);
        let stone = BlockState::new("block_0");
        states.set(7, &stone);
        assert_eq!(*states.get(7), stone);
        assert_eq!(states.get(8).name(), "air");
        assert_eq!(states.palette_len(), Some(2));
    }

    #[test]
    fn test_palette_has_no_duplicates() {
        let mut states = PalettedStates::new(test_registry(100), PaletteConfig::default(), 4096);
        for i in 0..8 {
            states.set(i, &BlockState::new(format!("block_{}", i % 4)));
        }
        // Default + 4 distinct states, each inserted once.
        assert_eq!(states.palette_len(), Some(5));
    }

    #[test]
    fn test_resetting_same_value_is_idempotent() {
        let mut states = PalettedStates::new(test_registry(100), PaletteConfig::default(), 4096);
        let stone = BlockState::new("block_0");
        states.set(7, &stone);
        let width = states.width();
        states.set(7, &stone);
        assert_eq!(states.palette_len(), Some(2));
        assert_eq!(states.width(), width);
        assert_eq!(*states.get(7), stone);
    }

    #[test]
    fn test_seventeenth_entry_forces_width_five() {
        // Scenario: volume 4096, width 4, 16 distinct non-default states.
        // Palette reaches 17 entries, exceeding 2^4, so the array repacks.
        let mut states = PalettedStates::new(test_registry(400), PaletteConfig::default(), 4096);
        for i in 0..16 {
            states.set(i, &BlockState::new(format!("block_{i}")));
            assert!(states.width() >= 4);
        }
        assert_eq!(states.width(), 5);
        assert_eq!(states.palette_len(), Some(17));
        for i in 0..16 {
            assert_eq!(states.get(i).name(), format!("block_{i}"));
        }
        for i in 16..4096 {
            assert_eq!(states.get(i).name(), "air");
        }
    }

    #[test]
    fn test_width_never_decreases() {
        let mut states = PalettedStates::new(test_registry(2000), PaletteConfig::default(), 4096);
        let mut last = states.width();
        for i in 0..300 {
            states.set(i % 4096, &BlockState::new(format!("block_{i}")));
            assert!(states.width() >= last, "width shrank at insertion {i}");
            last = states.width();
        }
    }

    #[test]
    fn test_local_size_threshold_switches_to_global() {
        // Scenario: max local size 64; the 65th distinct non-default state
        // pushes the palette past the threshold.
        let registry = test_registry(1000);
        let config = PaletteConfig {
            min_width: 4,
            max_local_len: 64,
        };
        let mut states = PalettedStates::new(Arc::clone(&registry), config, 4096);
        for i in 0..65 {
            states.set(i, &BlockState::new(format!("block_{i}")));
        }
        assert!(states.is_global());
        assert_eq!(states.palette_len(), None);
        assert_eq!(states.width(), bits_for(registry.len()));
        for i in 0..65 {
            assert_eq!(states.get(i).name(), format!("block_{i}"));
        }
        assert_eq!(states.get(65).name(), "air");
    }

    #[test]
    fn test_exhausting_registry_switches_to_global() {
        // Registry holds air + 3 states; a 4th palette entry would mirror the
        // whole registry, so local addressing stops saving space.
        let registry = test_registry(3);
        let mut states =
            PalettedStates::new(Arc::clone(&registry), PaletteConfig::default(), 256);
        states.set(0, &BlockState::new("block_0"));
        states.set(1, &BlockState::new("block_1"));
        assert!(!states.is_global());
        states.set(2, &BlockState::new("block_2"));
        assert!(states.is_global());
        assert_eq!(states.get(0).name(), "block_0");
        assert_eq!(states.get(1).name(), "block_1");
        assert_eq!(states.get(2).name(), "block_2");
        assert_eq!(states.get(3).name(), "air");
    }

    #[test]
    fn test_global_mode_accepts_new_registrations() {
        let registry = test_registry(1000);
        let config = PaletteConfig {
            min_width: 4,
            max_local_len: 4,
        };
        let mut states = PalettedStates::new(Arc::clone(&registry), config, 64);
        for i in 0..8 {
            states.set(i, &BlockState::new(format!("block_{i}")));
        }
        assert!(states.is_global());
        // A state the registry has never seen still stores correctly.
        let fresh = BlockState::new("late_arrival").with_property("axis", "y");
        states.set(9, &fresh);
        assert_eq!(*states.get(9), fresh);
    }

    #[test]
    fn test_global_width_grows_with_registry() {
        // Switch happens with a tiny registry; registering dozens of new
        // states afterwards must widen the array instead of overflowing it.
        let registry = test_registry(3);
        let mut states = PalettedStates::new(Arc::clone(&registry), PaletteConfig::default(), 64);
        states.set(0, &BlockState::new("block_0"));
        states.set(1, &BlockState::new("block_1"));
        states.set(2, &BlockState::new("block_2"));
        assert!(states.is_global());
        let narrow = states.width();
        for i in 0..40 {
            states.set(i, &BlockState::new(format!("late_{i}")));
        }
        assert!(states.width() > narrow);
        for i in 0..40 {
            assert_eq!(states.get(i).name(), format!("late_{i}"));
        }
    }

    #[test]
    fn test_snapshot_roundtrip_local() {
        let registry = test_registry(100);
        let mut states =
            PalettedStates::new(Arc::clone(&registry), PaletteConfig::default(), 4096);
        for i in 0..64 {
            states.set(i * 7, &BlockState::new(format!("block_{}", i % 9)));
        }
        let snapshot = states.snapshot();
        assert!(!snapshot.palette.is_empty());
        let restored = PalettedStates::from_snapshot(
            snapshot,
            Arc::clone(&registry),
            PaletteConfig::default(),
            4096,
        )
        .unwrap();
        for i in 0..4096 {
            assert_eq!(states.get(i), restored.get(i), "mismatch at {i}");
        }
    }

    #[test]
    fn test_snapshot_roundtrip_global() {
        let registry = test_registry(500);
        let config = PaletteConfig {
            min_width: 4,
            max_local_len: 16,
        };
        let mut states = PalettedStates::new(Arc::clone(&registry), config, 4096);
        for i in 0..100 {
            states.set(i * 3, &BlockState::new(format!("block_{i}")));
        }
        assert!(states.is_global());
        let snapshot = states.snapshot();
        assert!(snapshot.palette.is_empty());
        let restored =
            PalettedStates::from_snapshot(snapshot, Arc::clone(&registry), config, 4096).unwrap();
        for i in 0..4096 {
            assert_eq!(states.get(i), restored.get(i), "mismatch at {i}");
        }
    }

    #[test]
    fn test_snapshot_width_recomputed_from_palette() {
        // A two-entry palette packs at 1 bit on disk even though the live
        // array was created at 4 bits.
        let registry = test_registry(100);
        let mut states =
            PalettedStates::new(Arc::clone(&registry), PaletteConfig::default(), 256);
        states.set(0, &BlockState::new("block_0"));
        let snapshot = states.snapshot();
        // Writer repacks to the implied width: 2 entries -> 1 bit -> 4 words.
        assert_eq!(snapshot.palette.len(), 2);
        assert_eq!(snapshot.words.len(), 4);
        let restored = PalettedStates::from_snapshot(
            snapshot,
            Arc::clone(&registry),
            PaletteConfig::default(),
            256,
        )
        .unwrap();
        assert_eq!(restored.width(), 1);
        assert_eq!(restored.get(0).name(), "block_0");
        assert_eq!(restored.get(1).name(), "air");
        // Growth from a 1-bit deserialized array still works.
        let mut restored = restored;
        restored.set(2, &BlockState::new("block_1"));
        assert_eq!(restored.width(), 2);
        assert_eq!(restored.get(0).name(), "block_0");
    }

    #[test]
    fn test_corrupt_word_count_is_reported() {
        let registry = test_registry(100);
        let snapshot = SectionSnapshot {
            palette: vec![BlockState::new("air"), BlockState::new("block_0")],
            words: vec![0u64; 3],
        };
        let err = PalettedStates::from_snapshot(
            snapshot,
            Arc::clone(&registry),
            PaletteConfig::default(),
            256,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CorruptSection::WordCountMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_corrupt_global_id_is_reported() {
        let registry = test_registry(2); // len 3, width 2
        let width = bits_for(registry.len());
        let mut packed = PackedArray::new(width, 64);
        packed.set(5, 3); // id 3 does not exist
        let snapshot = SectionSnapshot {
            palette: Vec::new(),
            words: packed.words().to_vec(),
        };
        let err =
            PalettedStates::from_snapshot(snapshot, registry, PaletteConfig::default(), 64)
                .unwrap_err();
        assert!(matches!(err, CorruptSection::UnknownStateId(3)));
    }
}
