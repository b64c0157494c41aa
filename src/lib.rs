//! Synchronizes per-player game stats documents into a relational store.
//!
//! Documents are split into nine category tables and reconciled per player
//! inside one transaction, so re-running a sync converges instead of
//! duplicating rows.

pub mod cmd;
pub mod config;
pub mod error;
pub mod normalize;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod sync;
pub mod types;

pub use error::{Error, Result};
