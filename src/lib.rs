//! Synthesize Bulkrax `Collection` rows for an existing import sheet.
//!
//! Work rows (`Image`, `Video`, `Audio`) name their owning collection in the
//! `parents` column. For every distinct collection we fetch its MODS record,
//! project it onto the sheet's columns and append the result to the sheet.

pub mod error;
pub mod mods;
pub mod remote;
pub mod sheet;

pub use error::{Error, Result};
pub use mods::{MetadataDocument, RecordExtractor};
pub use remote::{FetchConfig, HttpSource, MetadataSource};
pub use sheet::{add_collections, default_output_path, MergeSummary, Row, Sheet};
