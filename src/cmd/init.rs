//! Schema bootstrap command.

use console::style;

use crate::{
   Result,
   config::Config,
   store::{SqliteStore, StatStore},
};

/// Creates missing tables, columns and indexes, then exits.
pub async fn execute(cfg: Config) -> Result<()> {
   let store = SqliteStore::connect(&cfg).await?;
   store.health_check().await?;
   store.ensure_schema().await?;

   tracing::info!(database = %cfg.database_url, "schema ready");
   println!(
      "{} {}",
      style("✓ Schema ready:").green(),
      style(&cfg.database_url).cyan()
   );
   Ok(())
}
