//! Product photo set management.
//!
//! This module owns the photo workflow end to end: the ingest pipeline that
//! validates and transcodes uploads, the staged edit session that batches
//! proposed changes, the commit coordinator that applies a batch atomically,
//! and the sweeper that expires renditions which never got committed. It
//! coordinates filesystem rendition storage with the database layer from
//! `vitrine_db`.

mod commit;
mod ingest;
mod session;
mod storage;
mod sweep;

pub use commit::{CommitCoordinator, CommittedSet};
pub use ingest::{IngestPipeline, PhotoDescriptor};
pub use session::{EditSession, EffectivePhoto, StagedOp};
pub use storage::{compute_hash, RenditionStore};
pub use sweep::{start_sweep_task, OrphanSweeper};
