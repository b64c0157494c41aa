//! Store status command.
//!
//! Prints row counts for the player registry, the raw archive and every
//! category table.

use console::style;

use crate::{
   Result,
   config::Config,
   store::{SqliteStore, StatStore},
};

pub async fn execute(cfg: Config, json: bool) -> Result<()> {
   let store = SqliteStore::connect(&cfg).await?;
   store.health_check().await?;
   let counts = store.table_counts().await?;

   if json {
      println!("{}", serde_json::to_string_pretty(&counts)?);
      return Ok(());
   }

   println!("{} {}", style("Store:").bold(), style(&cfg.database_url).cyan());
   for count in &counts {
      println!("  {:<28} {:>10}", count.table, count.rows);
   }
   Ok(())
}
