pub mod merge;
pub mod scheduler;

pub use merge::{merge, overlay};
pub use scheduler::{BufferedSyncWorker, SyncSchedule, SyncStats, spawn_buffered_sync};
