//! Hierarchical tagging and collections.
//!
//! Tags form a bounded four-level hierarchy in the SQLite side-store;
//! collections group memories, optionally by tag-filter predicate; the
//! auto-tagger proposes tags from raw content.

pub mod auto;
pub mod collections;
pub mod models;
pub mod tags;

pub use auto::{AutoTagger, DEFAULT_MAX_TAGS, DEFAULT_MIN_CONFIDENCE};
pub use collections::{CollectionStore, DEFAULT_COLLECTION_PATTERNS};
pub use models::{
    normalize_tag_name, Collection, CollectionMemory, FilterOp, MemoryTag, Tag, TagFilter,
    MAX_TAG_DEPTH,
};
pub use tags::TagStore;
