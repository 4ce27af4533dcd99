//! Compact palette-based block storage with per-slot concurrent access.
//!
//! The crate holds the core of the world server's storage stack: a
//! process-wide state registry, a fixed-width bit-packing codec, the
//! palette-compressed section storage built on both, and the stamped per-slot
//! locking that lets simulation, network, and persistence threads share a
//! column without a global lock.

pub mod column;
pub mod packed;
pub mod palette;
pub mod registry;
pub mod section;
pub mod snapshot;
pub mod stamped;

pub use column::SectionColumn;
pub use packed::PackedArray;
pub use palette::{PaletteConfig, PalettedStates};
pub use registry::{BlockState, StateId, StateRegistry};
pub use section::{SECTION_EDGE, SECTION_VOLUME, Section, linear_index};
pub use snapshot::{CorruptSection, SectionSnapshot};
pub use stamped::StampedLock;
