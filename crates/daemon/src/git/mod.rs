// Git access: discovery, scoped config reads, and the commit/verify gateway.

pub mod config;
pub mod discovery;
pub mod gateway;
pub mod signature;

pub use gateway::{short_hash, CommitOutcome, GitError, GitGateway, Repo, SigningConfig};
pub use signature::SignatureStatus;
