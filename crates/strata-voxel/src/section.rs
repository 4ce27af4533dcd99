//! A section: the fixed-volume cube of cells that is the unit of storage,
//! locking, and serialization.
//!
//! Sections are 16×16×16. Alongside the palette-compressed storage a section
//! tracks how many cells differ from the default state, which lets the column
//! layer discard a section that a write has made uniformly default again.

use std::sync::Arc;

use crate::palette::{PaletteConfig, PalettedStates};
use crate::registry::{BlockState, StateRegistry};
use crate::snapshot::{CorruptSection, SectionSnapshot};

/// Side length of a section in cells.
pub const SECTION_EDGE: usize = 16;

/// Total number of cells in a section (16³).
pub const SECTION_VOLUME: usize = SECTION_EDGE * SECTION_EDGE * SECTION_EDGE;

/// Converts `(x, y, z)` to a linear cell index (x varies fastest).
///
/// # Panics
///
/// Panics if any coordinate is outside `0..16`; callers are expected to
/// index correctly, so this is an assertion rather than a recoverable error.
pub fn linear_index(x: usize, y: usize, z: usize) -> usize {
    assert!(
        x < SECTION_EDGE && y < SECTION_EDGE && z < SECTION_EDGE,
        "cell position ({x}, {y}, {z}) outside section"
    );
    x + y * SECTION_EDGE + z * SECTION_EDGE * SECTION_EDGE
}

/// Palette-compressed storage for one 16×16×16 sub-region.
#[derive(Clone, Debug)]
pub struct Section {
    states: PalettedStates,
    /// Cells currently holding a non-default state.
    non_default: u32,
}

impl Section {
    /// Creates a section with every cell holding the registry default.
    pub fn new(registry: Arc<StateRegistry>, config: PaletteConfig) -> Self {
        Self {
            states: PalettedStates::new(registry, config, SECTION_VOLUME),
            non_default: 0,
        }
    }

    /// Returns the state at `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Arc<BlockState> {
        self.states.get(linear_index(x, y, z))
    }

    /// Sets the state at `(x, y, z)`, keeping the non-default cell count.
    pub fn set(&mut self, x: usize, y: usize, z: usize, state: &BlockState) {
        let index = linear_index(x, y, z);
        let default = self.states.default_state().clone();
        let was_default = *self.states.get(index) == *default;
        let is_default = *state == *default;
        self.states.set(index, state);
        match (was_default, is_default) {
            (true, false) => self.non_default += 1,
            (false, true) => self.non_default -= 1,
            _ => {}
        }
    }

    /// Returns `true` if every cell holds the default state.
    pub fn is_empty(&self) -> bool {
        self.non_default == 0
    }

    /// Number of cells holding a non-default state.
    pub fn non_default_count(&self) -> u32 {
        self.non_default
    }

    /// Current bits per packed entry.
    pub fn width(&self) -> u32 {
        self.states.width()
    }

    /// Number of local palette entries, or `None` in global mode.
    pub fn palette_len(&self) -> Option<usize> {
        self.states.palette_len()
    }

    /// Returns `true` once storage has switched to global addressing.
    pub fn is_global(&self) -> bool {
        self.states.is_global()
    }

    /// Visits every cell in linear order. This is the bulk read path used by
    /// network encoders.
    pub fn for_each_state(&self, mut f: impl FnMut(usize, &Arc<BlockState>)) {
        for index in 0..SECTION_VOLUME {
            let state = self.states.get(index);
            f(index, &state);
        }
    }

    /// Captures the persisted `(palette, words)` form.
    pub fn snapshot(&self) -> SectionSnapshot {
        self.states.snapshot()
    }

    /// Rebuilds a section from its persisted form.
    ///
    /// Reproduces every pre-serialization cell value; the non-default count
    /// is recomputed by scanning. Errors indicate corrupt input and leave the
    /// caller to substitute a default section.
    pub fn from_snapshot(
        snapshot: SectionSnapshot,
        registry: Arc<StateRegistry>,
        config: PaletteConfig,
    ) -> Result<Self, CorruptSection> {
        let states =
            PalettedStates::from_snapshot(snapshot, registry, config, SECTION_VOLUME)?;
        let default = states.default_state().clone();
        let mut non_default = 0u32;
        for index in 0..SECTION_VOLUME {
            if *states.get(index) != *default {
                non_default += 1;
            }
        }
        Ok(Self {
            states,
            non_default,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
