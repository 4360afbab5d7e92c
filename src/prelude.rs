//! Recommended API entrypoints grouped by abstraction level.
//!
//! `app` is the surface a UI layer needs. `advanced` exposes the storage
//! components for callers that want to drive them directly.

pub mod app {
    //! Document store, recovery port and buffered sync.
    pub use crate::{
        CanonicalDocument, DecisionPort, DocumentStore, LoadOutcome, PartialDocument, PolicyPort,
        RecoveryDecision, RecoveryPrompt, RelocationPolicy, SaveOutcome, StoreConfig, StoreError,
        SyncSchedule, spawn_buffered_sync,
    };
}

pub mod advanced {
    //! Escape hatch for the storage internals.
    pub use crate::storage::{
        AtomicWriter, ConfigLocator, FileSystem, RecoveringReader, SessionStore, TokioFs,
        WriteOutcome, archive, rescue,
    };
    pub use crate::sync::{merge, overlay};
}
