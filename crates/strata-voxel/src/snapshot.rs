//! Persisted form of a section and the corruption taxonomy for reading it
//! back.
//!
//! A snapshot is deliberately minimal: the palette list and the packed words.
//! The bit width is never stored; a reader recomputes it from the palette
//! size, or from the registry size when the palette is empty (global
//! addressing). That makes the representation independent of the process that
//! wrote it, at the cost of strict length validation on the way back in.

use serde::{Deserialize, Serialize};

use crate::registry::BlockState;

/// The serialized form of one section's state storage.
///
/// An empty `palette` means the words hold registry ids directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSnapshot {
    /// Ordered, duplicate-free palette; index 0 is the section default.
    pub palette: Vec<BlockState>,
    /// Packed entries, `ceil(volume * width / 64)` little-endian words.
    pub words: Vec<u64>,
}

/// Why a snapshot could not be turned back into a section.
///
/// Corruption is recoverable at section granularity: the caller substitutes
/// an all-default section and logs, rather than failing the surrounding
/// column load.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CorruptSection {
    /// The word array length does not match the width implied by the palette
    /// (or registry) size.
    #[error("word count inconsistent with implied width: expected {expected}, got {actual}")]
    WordCountMismatch {
        /// Word count the implied width requires.
        expected: usize,
        /// Word count actually present.
        actual: usize,
    },
    /// A global-mode entry names an id the registry cannot resolve.
    #[error("packed entry references unknown state id {0}")]
    UnknownStateId(u32),
}
