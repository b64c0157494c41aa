//! CLI command implementations for statsync.

pub mod config;
pub mod init;
pub mod status;
pub mod sync;
