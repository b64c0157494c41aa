//! Where player stats documents and display names come from.

mod local;
mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

pub use self::{local::LocalSource, memory::MemorySource};
use crate::error::{DocumentError, Result};

/// One entry of a fetched batch.
///
/// `document` carries per-player read/parse failures so a single bad file
/// never fails the whole batch.
#[derive(Debug)]
pub struct SourceEntry {
   pub player_id: String,
   pub document:  Result<Value, DocumentError>,
}

impl SourceEntry {
   pub fn ok(player_id: impl Into<String>, document: Value) -> Self {
      Self { player_id: player_id.into(), document: Ok(document) }
   }

   pub fn failed(player_id: impl Into<String>, err: DocumentError) -> Self {
      Self { player_id: player_id.into(), document: Err(err) }
   }
}

/// Producer of the document batch for one sync run.
///
/// An `Err` from either method means the source as a whole is unusable and
/// the run aborts before touching the store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
   /// All player documents currently available, keyed by raw player id.
   async fn fetch_all(&self) -> Result<Vec<SourceEntry>>;

   /// Player id to display name. Missing entries just leave names unset.
   async fn fetch_directory(&self) -> Result<HashMap<String, String>>;
}
