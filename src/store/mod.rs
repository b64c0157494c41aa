//! Relational storage abstraction with a `SQLite` implementation.

pub(crate) mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::types::{ApplyMode, PlayerOutcome, PlayerSnapshot};

pub use sqlite::{SqliteStore, StoreError};

/// Persistence gateway for the player registry, raw archive and category tables.
#[async_trait]
pub trait StatStore: Send + Sync {
   /// Creates missing tables, columns and indexes. Safe to call every run.
   async fn ensure_schema(&self) -> Result<(), StoreError>;

   /// Round-trips a trivial query.
   async fn health_check(&self) -> Result<(), StoreError>;

   /// Converges one player's rows to `snapshot` in a single transaction.
   ///
   /// `sync_time` becomes `last_seen`, `first_seen` for new players and the
   /// `updated_at` of every written row.
   async fn sync_player(
      &self,
      snapshot: &PlayerSnapshot,
      sync_time: DateTime<Utc>,
      mode: ApplyMode,
   ) -> Result<PlayerOutcome, StoreError>;

   /// Row counts per table.
   async fn table_counts(&self) -> Result<Vec<TableCount>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
   pub table: String,
   pub rows:  i64,
}

/// Formats a timestamp the way every table stores it.
pub fn timestamp(at: DateTime<Utc>) -> String {
   at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
