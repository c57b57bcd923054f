// Bibliographic Index Curation - Core Library
// Exposes the curation engines for use in the CLI and tests

pub mod audit;
pub mod database;
pub mod disambiguation;
pub mod keys;
pub mod normalize;
pub mod reconciliation;

// Re-export commonly used types
pub use audit::{
    AuditReport, ConsistencyAuditor, DoiAuditReport, KeyInitialsReport, PersonVariantReport,
    VolumeDoiCheck,
};
pub use database::{Database, Entry, EntryKey, Person, Value, ValuePart};
pub use disambiguation::Disambiguator;
pub use keys::{KeyDeriver, ManyAuthorsPolicy, SixInitialsPolicy, NO_AUTHOR_SENTINEL};
pub use normalize::normalize_name_part;
pub use reconciliation::{
    levenshtein, CandidateAuthor, CandidateWork, CrossrefClient, DoiReconciler, MetadataQuery,
    MetadataSource, ReconcileOutcome, ReconcileReport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
