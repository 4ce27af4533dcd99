//! Concurrent section array: one stamped lock per section slot, so many
//! sections of a column can be read and written in parallel without any
//! column-wide lock.
//!
//! A slot holds `Option<Section>`; `None` means the section is implicitly
//! all-default. Sections materialize on the first non-default write and are
//! released back to `None` when a write leaves them uniformly default. No
//! operation holds more than one slot's lock at a time.

use std::sync::Arc;

use crate::palette::PaletteConfig;
use crate::registry::{BlockState, StateRegistry};
use crate::section::Section;
use crate::stamped::StampedLock;

/// A vertical stack of independently locked section slots.
#[derive(Debug)]
pub struct SectionColumn {
    slots: Vec<StampedLock<Option<Section>>>,
    registry: Arc<StateRegistry>,
    config: PaletteConfig,
}

impl SectionColumn {
    /// Creates a column of `section_count` empty (absent) slots.
    pub fn new(section_count: usize, registry: Arc<StateRegistry>, config: PaletteConfig) -> Self {
        Self {
            slots: (0..section_count).map(|_| StampedLock::new(None)).collect(),
            registry,
            config,
        }
    }

    /// Number of section slots.
    pub fn section_count(&self) -> usize {
        self.slots.len()
    }

    /// Non-blocking read of one slot, validated by version stamp and retried
    /// through the blocking path on interference. `None` means the section is
    /// all-default.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; slot indexing is the caller's
    /// responsibility.
    pub fn optimistic_read<R>(&self, index: usize, mut f: impl FnMut(Option<&Section>) -> R) -> R {
        self.slot(index).optimistic_read(|slot| f(slot.as_ref()))
    }

    /// Blocking shared read of one slot.
    pub fn read<R>(&self, index: usize, mut f: impl FnMut(Option<&Section>) -> R) -> R {
        self.slot(index).read(|slot| f(slot.as_ref()))
    }

    /// Exclusive write access to one slot. The closure may replace the stored
    /// section, e.g. materialize one or discard an all-default one.
    pub fn write<R>(&self, index: usize, f: impl FnOnce(&mut Option<Section>) -> R) -> R {
        self.slot(index).write(f)
    }

    /// Returns the state at `(x, y, z)` of section `index`, the default state
    /// if the section is absent.
    pub fn state_at(&self, index: usize, x: usize, y: usize, z: usize) -> Arc<BlockState> {
        self.optimistic_read(index, |section| match section {
            Some(section) => section.get(x, y, z),
            None => self.registry.default_state(),
        })
    }

    /// Sets the state at `(x, y, z)` of section `index`.
    ///
    /// An absent section materializes on the first non-default write; a write
    /// that makes a section uniformly default again releases it back to
    /// absent. Setting the default in an absent section is a no-op.
    pub fn set_state(&self, index: usize, x: usize, y: usize, z: usize, state: &BlockState) {
        let registry = &self.registry;
        let config = self.config;
        self.write(index, |slot| {
            let section = match slot {
                Some(section) => section,
                None => {
                    if *state == *registry.default_state() {
                        return;
                    }
                    slot.insert(Section::new(Arc::clone(registry), config))
                }
            };
            section.set(x, y, z, state);
            if section.is_empty() {
                *slot = None;
            }
        });
    }

    fn slot(&self, index: usize) -> &StampedLock<Option<Section>> {
        assert!(
            index < self.slots.len(),
            "section index {index} out of range ({})",
            self.slots.len()
        );
        &self.slots[index]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
