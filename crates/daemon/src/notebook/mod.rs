// Notebook content hashing and persistence.

pub mod hash;
pub mod store;

pub use hash::{content_hash, ContentHash, HashError};
pub use store::{FsNotebookStore, NotebookStore, StoreError};
