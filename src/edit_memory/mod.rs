//! What the crate forwards to the long-term memory store: sentence deltas
//! from response edits and per-stage snapshots.

pub mod diff;
pub mod snapshot;

pub use diff::{
    extract_sentence_deltas, split_sentences, EditMemoryPayload, RequirementsContext,
    SentenceDelta,
};
pub use snapshot::{
    build_query_snapshot, preprocess_snapshot, requirements_snapshot, source_hash, MemoryMessage,
    SnapshotMetadata, SnapshotStage, StageSnapshot,
};
