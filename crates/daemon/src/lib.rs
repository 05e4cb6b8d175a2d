// gitseal-daemon library: the lock/unlock protocol and its HTTP surface.

pub mod api;
pub mod command;
pub mod config;
pub mod git;
pub mod identity;
pub mod notebook;
pub mod seal;
pub mod signing;
