pub mod store;

pub use store::{DocumentStore, LoadOutcome, LoadSource, LoadedDocument, SaveOutcome};
