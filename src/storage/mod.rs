pub mod archive;
pub mod atomic;
pub mod fs;
pub mod locator;
pub mod reader;
pub mod rescue;
pub mod session;

pub use archive::{ArchiveManifest, UnpackedArchive};
pub use atomic::{AtomicWriter, WriteOutcome};
pub use fs::{FileSystem, TokioFs};
pub use locator::{
    ConfigLocator, ConfigRecord, LocationOrigin, Relocation, RelocationPolicy, ResolvedLocation,
};
pub use reader::RecoveringReader;
pub use rescue::RescueArtifact;
pub use session::SessionStore;
