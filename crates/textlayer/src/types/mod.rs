//! Core data model: geometry, words/lines, page results and script kinds.

mod elements;
mod geometry;
mod script;

pub use elements::{ALGORITHM_VERSION, DropRecord, Line, LineBox, PageResult, Word, WordKey};
pub use geometry::BBox;
pub use script::{ScriptKind, has_lang_code, is_cjk_language, is_thai_language, normalize_language};
