//! Column files on disk: save and load whole columns of sections.
//!
//! A section that fails to decode or validate is replaced with an absent
//! (all-default) slot and logged with its column and section index; the rest
//! of the column loads normally. Only file-level problems (I/O, bad magic,
//! broken framing) fail a column load.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_config::StorageConfig;
use strata_voxel::{PaletteConfig, Section, SectionColumn, SectionSnapshot, StateRegistry};
use tracing::warn;

use crate::error::PersistError;
use crate::format::{DecodedSection, decode_column, encode_column};

/// Directory of column files, one `col_{x}_{z}.svxc` per column.
pub struct ColumnStore {
    root: PathBuf,
}

impl ColumnStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a store rooted at the configured data directory.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.data_dir.clone())
    }

    /// Returns the store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if a file for column `(x, z)` exists.
    pub fn column_exists(&self, x: i32, z: i32) -> bool {
        self.path_for(x, z).exists()
    }

    /// Serializes every section of `column` and writes the column file.
    ///
    /// Each slot is snapshotted under its own shared lock; the write never
    /// holds more than one slot's lock at a time and no lock spans the file
    /// I/O.
    pub fn save_column(&self, x: i32, z: i32, column: &SectionColumn) -> Result<(), PersistError> {
        self.save_snapshots(x, z, &snapshot_slots(column))
    }

    /// Writes already-captured snapshots as the column file for `(x, z)`.
    ///
    /// This is the half of [`save_column`](Self::save_column) that background
    /// save workers run off-thread.
    pub fn save_snapshots(
        &self,
        x: i32,
        z: i32,
        slots: &[Option<SectionSnapshot>],
    ) -> Result<(), PersistError> {
        let bytes = encode_column(slots);
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(x, z), bytes)?;
        Ok(())
    }

    /// Reads the column file for `(x, z)` and rebuilds its sections.
    ///
    /// Corrupt sections become absent slots and are logged; they never abort
    /// the load of their siblings.
    pub fn load_column(
        &self,
        x: i32,
        z: i32,
        registry: Arc<StateRegistry>,
        config: PaletteConfig,
    ) -> Result<SectionColumn, PersistError> {
        let bytes = fs::read(self.path_for(x, z))?;
        let decoded = decode_column(&bytes)?;

        let column = SectionColumn::new(decoded.len(), Arc::clone(&registry), config);
        for (index, slot) in decoded.into_iter().enumerate() {
            match slot {
                DecodedSection::Absent => {}
                DecodedSection::Section(snapshot) => {
                    match Section::from_snapshot(snapshot, Arc::clone(&registry), config) {
                        Ok(section) if !section.is_empty() => {
                            column.write(index, |slot| *slot = Some(section));
                        }
                        // A saved section that turned out uniformly default
                        // collapses back to an absent slot.
                        Ok(_) => {}
                        Err(err) => {
                            warn!(
                                column.x = x,
                                column.z = z,
                                section = index,
                                %err,
                                "corrupt section replaced with default"
                            );
                        }
                    }
                }
                DecodedSection::Corrupt(err) => {
                    warn!(
                        column.x = x,
                        column.z = z,
                        section = index,
                        %err,
                        "unreadable section replaced with default"
                    );
                }
            }
        }
        Ok(column)
    }

    fn path_for(&self, x: i32, z: i32) -> PathBuf {
        self.root.join(format!("col_{x}_{z}.svxc"))
    }
}

/// Builds the palette tuning for new sections from the storage config.
pub fn palette_config(config: &StorageConfig) -> PaletteConfig {
    PaletteConfig {
        min_width: config.min_index_width,
        max_local_len: config.max_local_palette,
    }
}

/// Captures one snapshot per slot, each under its own shared lock.
pub fn snapshot_slots(column: &SectionColumn) -> Vec<Option<SectionSnapshot>> {
    (0..column.section_count())
        .map(|index| column.read(index, |section| section.map(Section::snapshot)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
