//! Column persistence: on-disk format, column store, and background saving.

pub mod error;
pub mod format;
pub mod store;
pub mod worker;

pub use error::PersistError;
pub use format::{DecodedSection, FORMAT_VERSION, MAGIC, decode_column, encode_column};
pub use store::{ColumnStore, palette_config, snapshot_slots};
pub use worker::{ColumnSaveWorker, SaveOutcome, SaveTask};
