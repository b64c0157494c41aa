//! Batch synchronization of player stats documents into the store

use std::{
   collections::{BTreeMap, HashMap, HashSet},
   pin::pin,
   time::Duration,
};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use indicatif::ProgressBar;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
   Error, Result,
   config::Config,
   error::DocumentError,
   normalize::normalize,
   source::{DocumentSource, SourceEntry},
   store::{StatStore, StoreError},
   types::{ApplyMode, Category, CategoryCounts, PlayerId, PlayerOutcome, PlayerSnapshot},
};

/// Knobs for one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
   pub workers:           usize,
   pub mode:              ApplyMode,
   pub progress_interval: usize,
   pub cancel:            CancellationToken,
   pub deadline:          Option<Duration>,
}

impl Default for SyncOptions {
   fn default() -> Self {
      Self {
         workers:           1,
         mode:              ApplyMode::Commit,
         progress_interval: 50,
         cancel:            CancellationToken::new(),
         deadline:          None,
      }
   }
}

impl SyncOptions {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         workers: cfg.effective_workers(),
         progress_interval: cfg.progress_interval(),
         deadline: cfg.deadline(),
         ..Self::default()
      }
   }
}

/// Progress snapshot handed to a [`SyncProgressCallback`]
#[derive(Debug, Clone)]
pub struct SyncProgress {
   pub processed:      usize,
   pub failed:         usize,
   pub total:          usize,
   pub current_player: Option<String>,
}

/// Trait for receiving sync progress updates
pub trait SyncProgressCallback: Send {
   fn progress(&mut self, progress: SyncProgress);
}

impl<F: FnMut(SyncProgress) + Send> SyncProgressCallback for F {
   fn progress(&mut self, progress: SyncProgress) {
      self(progress);
   }
}

impl SyncProgressCallback for () {
   fn progress(&mut self, _progress: SyncProgress) {}
}

impl SyncProgressCallback for ProgressBar {
   fn progress(&mut self, progress: SyncProgress) {
      self.update(|state| {
         state.set_len(progress.total as u64);
         state.set_pos(progress.processed as u64);
      });
      if let Some(player) = &progress.current_player {
         let short = player.split('-').next().unwrap_or(player);
         self.set_message(short.to_string());
      }
   }
}

/// Why a player was not converged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
   Document,
   Store,
   ConnectionLost,
}

impl FailureKind {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Document => "document",
         Self::Store => "store",
         Self::ConnectionLost => "connection_lost",
      }
   }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerFailure {
   pub player_id: String,
   pub kind:      FailureKind,
   pub message:   String,
}

impl PlayerFailure {
   fn document(player_id: &str, err: &DocumentError) -> Self {
      Self { player_id: player_id.to_string(), kind: FailureKind::Document, message: err.to_string() }
   }

   fn store(player_id: &str, err: &StoreError) -> Self {
      let kind = if err.is_connection_loss() {
         FailureKind::ConnectionLost
      } else {
         FailureKind::Store
      };
      Self { player_id: player_id.to_string(), kind, message: err.to_string() }
   }
}

/// Result summary from a sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
   pub mode:           ApplyMode,
   pub players_seen:   usize,
   pub processed:      usize,
   pub new_players:    usize,
   pub failed:         usize,
   pub not_attempted:  usize,
   pub cancelled:      bool,
   pub skipped_values: usize,
   pub categories:     BTreeMap<Category, CategoryCounts>,
   pub failures:       Vec<PlayerFailure>,
}

impl SyncSummary {
   fn new(mode: ApplyMode, players_seen: usize) -> Self {
      Self {
         mode,
         players_seen,
         processed: 0,
         new_players: 0,
         failed: 0,
         not_attempted: 0,
         cancelled: false,
         skipped_values: 0,
         categories: Category::ALL
            .into_iter()
            .map(|c| (c, CategoryCounts::default()))
            .collect(),
         failures: Vec::new(),
      }
   }

   pub fn counts_for(&self, category: Category) -> CategoryCounts {
      self.categories.get(&category).copied().unwrap_or_default()
   }

   /// Sum of inserted, updated and deleted rows over all categories.
   pub fn total_changes(&self) -> u64 {
      self.categories.values().map(CategoryCounts::total).sum()
   }

   pub const fn attempted(&self) -> usize {
      self.processed + self.failed
   }

   fn record_success(&mut self, done: &UnitDone) {
      self.processed += 1;
      self.skipped_values += done.skipped;
      if done.outcome.new_player {
         self.new_players += 1;
      }
      for category in Category::ALL {
         self
            .categories
            .entry(category)
            .or_default()
            .add(done.outcome.changes_for(category));
      }
   }

   fn record_failure(&mut self, failure: PlayerFailure) {
      self.failed += 1;
      self.failures.push(failure);
   }
}

struct UnitDone {
   player_id: PlayerId,
   outcome:   PlayerOutcome,
   skipped:   usize,
}

/// Keeps the first document per canonical player; later spellings of the
/// same identifier become document failures so each player syncs once.
fn dedupe_players(entries: Vec<SourceEntry>) -> Vec<SourceEntry> {
   let mut seen = HashSet::new();
   entries
      .into_iter()
      .map(|entry| match PlayerId::parse(&entry.player_id) {
         Ok(id) if !seen.insert(id.clone()) => {
            let err = DocumentError::DuplicatePlayerId(entry.player_id.clone());
            SourceEntry::failed(entry.player_id, err)
         },
         _ => entry,
      })
      .collect()
}

/// Engine that converges the store to every document a source provides
pub struct SyncEngine<D: DocumentSource, S: StatStore> {
   source: D,
   store:  S,
}

impl<D, S> SyncEngine<D, S>
where
   D: DocumentSource,
   S: StatStore,
{
   pub const fn new(source: D, store: S) -> Self {
      Self { source, store }
   }

   pub const fn source(&self) -> &D {
      &self.source
   }

   pub const fn store(&self) -> &S {
      &self.store
   }

   /// Runs one pass over the whole batch.
   ///
   /// Per-player failures are recorded in the summary. Only a source that
   /// cannot produce a batch or a lost store connection returns `Err`.
   pub async fn run(
      &self,
      options: &SyncOptions,
      sync_time: DateTime<Utc>,
      callback: &mut dyn SyncProgressCallback,
   ) -> Result<SyncSummary> {
      let names = self.player_names().await?;
      let entries = dedupe_players(self.source.fetch_all().await?);

      let total = entries.len();
      let workers = options.workers.max(1);
      let interval = options.progress_interval.max(1);
      let mut summary = SyncSummary::new(options.mode, total);

      tracing::info!(players = total, workers, mode = ?options.mode, "sync started");

      let stop = options.cancel.child_token();
      let deadline = options.deadline.map(|after| {
         let token = stop.clone();
         tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tracing::warn!(seconds = after.as_secs(), "deadline reached, no new players dispatched");
            token.cancel();
         })
      });

      let units = stream::iter(entries)
         .take_until(stop.clone().cancelled_owned())
         .map(|entry| self.sync_entry(entry, &names, sync_time, options.mode))
         .buffer_unordered(workers);
      let mut units = pin!(units);

      let mut connection_lost: Option<String> = None;
      while let Some(result) = units.next().await {
         let current_player = match result {
            Ok(done) => {
               summary.record_success(&done);
               done.player_id.to_string()
            },
            Err(failure) => {
               tracing::warn!(
                  player = %failure.player_id,
                  kind = failure.kind.as_str(),
                  "player sync failed: {}",
                  failure.message
               );
               if failure.kind == FailureKind::ConnectionLost && connection_lost.is_none() {
                  connection_lost = Some(failure.message.clone());
                  stop.cancel();
               }
               let player = failure.player_id.clone();
               summary.record_failure(failure);
               player
            },
         };

         let attempted = summary.attempted();
         callback.progress(SyncProgress {
            processed: attempted,
            failed: summary.failed,
            total,
            current_player: Some(current_player),
         });
         if attempted % interval == 0 {
            tracing::info!(attempted, total, failed = summary.failed, "sync progress");
         }
      }

      if let Some(handle) = deadline {
         handle.abort();
      }

      summary.not_attempted = total - summary.attempted();

      if let Some(reason) = connection_lost {
         tracing::error!(
            attempted = summary.attempted(),
            not_attempted = summary.not_attempted,
            "store connection lost, run aborted"
         );
         return Err(Error::Fatal { reason: format!("store connection lost: {reason}") });
      }

      summary.cancelled = summary.not_attempted > 0;
      tracing::info!(
         processed = summary.processed,
         failed = summary.failed,
         not_attempted = summary.not_attempted,
         changes = summary.total_changes(),
         cancelled = summary.cancelled,
         "sync finished"
      );
      Ok(summary)
   }

   /// Directory keyed by canonical id. Blank names and unparsable ids are
   /// dropped so they can never clear a stored name.
   async fn player_names(&self) -> Result<HashMap<PlayerId, String>> {
      let directory = self.source.fetch_directory().await?;
      Ok(directory
         .into_iter()
         .filter_map(|(id, name)| {
            let name = name.trim();
            if name.is_empty() {
               return None;
            }
            PlayerId::parse(&id).ok().map(|id| (id, name.to_string()))
         })
         .collect())
   }

   async fn sync_entry(
      &self,
      entry: SourceEntry,
      names: &HashMap<PlayerId, String>,
      sync_time: DateTime<Utc>,
      mode: ApplyMode,
   ) -> Result<UnitDone, PlayerFailure> {
      let SourceEntry { player_id: raw_id, document } = entry;
      let player_id =
         PlayerId::parse(&raw_id).map_err(|e| PlayerFailure::document(&raw_id, &e))?;
      let document: Value = document.map_err(|e| PlayerFailure::document(player_id.as_str(), &e))?;
      let normalized =
         normalize(&document).map_err(|e| PlayerFailure::document(player_id.as_str(), &e))?;

      for skipped in &normalized.skipped {
         tracing::debug!(
            player = %player_id,
            category = %skipped.category,
            key = %skipped.key,
            reason = ?skipped.reason,
            "skipped stat value"
         );
      }

      let snapshot = PlayerSnapshot {
         display_name: names.get(&player_id).cloned(),
         player_id,
         raw: document,
         stats: normalized.stats,
      };
      let outcome = self
         .store
         .sync_player(&snapshot, sync_time, mode)
         .await
         .map_err(|e| PlayerFailure::store(snapshot.player_id.as_str(), &e))?;

      tracing::debug!(
         player = %snapshot.player_id,
         new_player = outcome.new_player,
         changes = outcome.total_changes(),
         "player synced"
      );
      Ok(UnitDone { player_id: snapshot.player_id, outcome, skipped: normalized.skipped.len() })
   }
}
