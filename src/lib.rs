// ============================================================================
// DocGuard Library
// ============================================================================

pub mod config;
pub mod core;
pub mod facade;
pub mod prelude;
pub mod recovery;
pub mod storage;
pub mod sync;

// Re-export main types for convenience
pub use config::{MountPolicy, ReadPolicy, StoreConfig, WritePolicy};
pub use core::{CanonicalDocument, ErrorKind, PartialDocument, Result, StoreError};
pub use facade::{DocumentStore, LoadOutcome, LoadSource, LoadedDocument, SaveOutcome};
pub use recovery::{DecisionPort, PolicyPort, RecoveryDecision, RecoveryOption, RecoveryPrompt};
pub use storage::{
    AtomicWriter, FileSystem, RecoveringReader, RelocationPolicy, RescueArtifact, ResolvedLocation,
    TokioFs, WriteOutcome,
};
pub use sync::{BufferedSyncWorker, SyncSchedule, SyncStats, spawn_buffered_sync};
