pub mod document;
pub mod error;

pub use document::{CanonicalDocument, ID_KEY, PartialDocument, Record, record_id};
pub use error::{ErrorKind, Result, StoreError};
