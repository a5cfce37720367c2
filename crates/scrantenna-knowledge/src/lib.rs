//! Scrantenna Knowledge - Entity vault and resolution
//!
//! Keeps a durable catalog of every entity the pipeline has seen, stored as
//! markdown records with YAML front matter, and ties freshly extracted
//! entities back to those records:
//! - [`KnowledgeStore`]: loads the vault and indexes names and aliases
//! - [`EntityResolver`]: exact, pattern and fuzzy matching, record creation
//!   and relationship merging
//!
//! The resolver borrows the store mutably, so there is one writer at a time.
//! Share a store across threads behind a `Mutex`.

pub mod record;
pub mod resolver;
pub mod store;

pub use record::{FrontMatter, KnowledgeRecord, RecordRelationship};
pub use resolver::{
    reverse_relationship, EntityResolver, ResolutionFailure, ResolutionMethod, ResolvedEntity,
    ResolvedExtractionResult,
};
pub use store::{folder_for, slugify, KnowledgeStore, RecordId, VaultStatistics};
