//! One sync pass from the configured world directory into the store.

use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
   Error, Result,
   config::{Config, MAX_WORKERS},
   source::LocalSource,
   store::{SqliteStore, StatStore},
   sync::{SyncEngine, SyncOptions, SyncSummary},
   types::{ApplyMode, Category},
};

/// Flags of the `sync` subcommand
#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
   pub dry_run:     bool,
   pub json:        bool,
   pub workers:     Option<usize>,
   pub no_progress: bool,
}

pub async fn execute(cfg: Config, args: SyncArgs) -> Result<()> {
   let store = SqliteStore::connect(&cfg).await?;
   store.health_check().await?;
   store.ensure_schema().await?;

   let source = LocalSource::from_config(&cfg);
   tracing::debug!(dir = %source.stats_dir().display(), "reading stats documents");
   let engine = SyncEngine::new(source, store);

   let mut options = SyncOptions::from_config(&cfg);
   if let Some(workers) = args.workers {
      options.workers = workers.clamp(1, MAX_WORKERS);
   }
   if args.dry_run {
      options.mode = ApplyMode::DryRun;
   }

   let cancel = options.cancel.clone();
   let interrupt = tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
         tracing::warn!("interrupt received, finishing in-flight players");
         cancel.cancel();
      }
   });

   let sync_time = Utc::now();
   let result = if args.no_progress || args.json {
      engine.run(&options, sync_time, &mut ()).await
   } else {
      let mut pb = progress_bar();
      let result = engine.run(&options, sync_time, &mut pb).await;
      pb.finish_and_clear();
      result
   };
   interrupt.abort();
   let summary = result?;

   if args.json {
      println!("{}", serde_json::to_string_pretty(&summary)?);
   } else {
      print_summary(&summary);
   }

   verdict(&summary)
}

fn progress_bar() -> ProgressBar {
   let pb = ProgressBar::new(0);
   if let Ok(bar) = ProgressStyle::default_bar()
      .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
   {
      pb.set_style(bar.progress_chars("█▓░"));
   }
   pb.set_message("...");
   pb
}

/// Maps a finished run to the process outcome.
fn verdict(summary: &SyncSummary) -> Result<()> {
   if summary.cancelled {
      return Err(Error::Reported {
         message:   format!("cancelled; {} players not attempted", summary.not_attempted),
         exit_code: Error::EXIT_CANCELLED,
      });
   }
   if summary.failed > 0 {
      return Err(Error::Reported {
         message:   format!("{} of {} players failed", summary.failed, summary.players_seen),
         exit_code: Error::EXIT_PARTIAL,
      });
   }
   Ok(())
}

fn print_summary(summary: &SyncSummary) {
   let heading = match summary.mode {
      ApplyMode::Commit => "Sync summary",
      ApplyMode::DryRun => "Sync summary (dry run, nothing written)",
   };
   println!("{}", style(heading).bold());
   println!(
      "  players: {} seen, {} synced ({} new), {} failed, {} not attempted",
      summary.players_seen,
      summary.processed,
      summary.new_players,
      summary.failed,
      summary.not_attempted
   );
   if summary.skipped_values > 0 {
      println!("  {}", style(format!("{} stat values skipped", summary.skipped_values)).yellow());
   }
   println!();

   println!(
      "  {:<12} {:>10} {:>10} {:>10}",
      style("category").dim(),
      style("inserted").dim(),
      style("updated").dim(),
      style("deleted").dim()
   );
   for category in Category::ALL {
      let counts = summary.counts_for(category);
      println!(
         "  {:<12} {:>10} {:>10} {:>10}",
         category.as_str(),
         counts.inserted,
         counts.updated,
         counts.deleted
      );
   }

   if !summary.failures.is_empty() {
      println!();
      println!("{}", style("Failures:").red().bold());
      for failure in &summary.failures {
         println!(
            "  {} {} {}",
            style("✗").red(),
            failure.player_id,
            style(format!("({}: {})", failure.kind.as_str(), failure.message)).dim()
         );
      }
   }

   if summary.cancelled {
      println!();
      println!("{}", style("Run cancelled before all players were attempted").yellow());
   } else if summary.failures.is_empty() {
      println!();
      println!("{}", style(format!("✓ {} row changes", summary.total_changes())).green());
   }
}
