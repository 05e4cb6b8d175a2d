// gitseal-common: shared types for the gitseal workspace

pub mod notebook;
pub mod protocol;
pub mod types;
