//! `SQLite`-backed stat storage on an sqlx connection pool.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
   QueryBuilder, Transaction,
   sqlite::{
      Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
      SqlitePoolOptions, SqliteSynchronous,
   },
};

use crate::{
   config::{Config, PLAYERS_TABLE, TableNames},
   reconcile::{self, CategoryPlan},
   store::{StatStore, TableCount, timestamp},
   types::{ApplyMode, Category, NormalizedStats, PlayerId, PlayerOutcome, PlayerSnapshot},
};

/// Rows per multi-value INSERT; four binds each keeps us under SQLite's
/// default variable limit.
const INSERT_BATCH_ROWS: usize = 200;

const PLAYER_COLUMNS: &[(&str, &str)] = &[
   ("name", "name TEXT"),
   ("first_seen", "first_seen TEXT NOT NULL DEFAULT ''"),
   ("last_seen", "last_seen TEXT NOT NULL DEFAULT ''"),
];

const RAW_COLUMNS: &[(&str, &str)] = &[
   ("raw_json", "raw_json TEXT NOT NULL DEFAULT '{}'"),
   ("updated_at", "updated_at TEXT NOT NULL DEFAULT ''"),
];

const CATEGORY_COLUMNS: &[(&str, &str)] = &[
   ("stat_value", "stat_value INTEGER NOT NULL DEFAULT 0"),
   ("updated_at", "updated_at TEXT NOT NULL DEFAULT ''"),
];

/// Double-quotes a configured table or index name so SQL keywords work.
/// Names are validated identifiers, so they never contain a quote.
fn quoted(name: &str) -> String {
   format!("\"{name}\"")
}

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
   #[error("invalid database url: {0}")]
   InvalidUrl(#[source] sqlx::Error),

   #[error("failed to connect to database: {0}")]
   Connect(#[source] sqlx::Error),

   #[error("health check failed: {0}")]
   HealthCheck(#[source] sqlx::Error),

   #[error("failed to prepare schema for {table}: {source}")]
   Schema {
      table:  String,
      #[source]
      source: sqlx::Error,
   },

   #[error("failed to begin transaction: {0}")]
   Begin(#[source] sqlx::Error),

   #[error("failed to upsert player: {0}")]
   UpsertPlayer(#[source] sqlx::Error),

   #[error("failed to serialize raw document: {0}")]
   SerializeRaw(#[source] serde_json::Error),

   #[error("failed to write raw document: {0}")]
   WriteRaw(#[source] sqlx::Error),

   #[error("failed to read {table}: {source}")]
   ReadRows {
      table:  String,
      #[source]
      source: sqlx::Error,
   },

   #[error("failed to {op} rows in {table}: {source}")]
   WriteRows {
      op:     &'static str,
      table:  String,
      #[source]
      source: sqlx::Error,
   },

   #[error("failed to commit transaction: {0}")]
   Commit(#[source] sqlx::Error),

   #[error("failed to count rows in {table}: {source}")]
   CountRows {
      table:  String,
      #[source]
      source: sqlx::Error,
   },
}

impl StoreError {
   fn sqlx(&self) -> Option<&sqlx::Error> {
      match self {
         Self::InvalidUrl(e)
         | Self::Connect(e)
         | Self::HealthCheck(e)
         | Self::Begin(e)
         | Self::UpsertPlayer(e)
         | Self::WriteRaw(e)
         | Self::Commit(e) => Some(e),
         Self::Schema { source, .. }
         | Self::ReadRows { source, .. }
         | Self::WriteRows { source, .. }
         | Self::CountRows { source, .. } => Some(source),
         Self::SerializeRaw(_) => None,
      }
   }

   /// True when the store itself is gone rather than one statement failing.
   pub fn is_connection_loss(&self) -> bool {
      matches!(
         self.sqlx(),
         Some(
            sqlx::Error::Io(_)
               | sqlx::Error::PoolTimedOut
               | sqlx::Error::PoolClosed
               | sqlx::Error::WorkerCrashed
         )
      )
   }
}

/// Stat store on a `SQLite` database file (or `sqlite::memory:`).
#[derive(Debug, Clone)]
pub struct SqliteStore {
   pool:   SqlitePool,
   tables: TableNames,
}

impl SqliteStore {
   pub async fn connect(cfg: &Config) -> Result<Self, StoreError> {
      Self::connect_with(
         &cfg.database_url,
         cfg.max_connections,
         cfg.busy_timeout(),
         cfg.tables.clone(),
      )
      .await
   }

   pub async fn connect_with(
      url: &str,
      max_connections: u32,
      busy_timeout: Duration,
      tables: TableNames,
   ) -> Result<Self, StoreError> {
      let in_memory = url.contains(":memory:") || url.contains("mode=memory");

      let mut opts = SqliteConnectOptions::from_str(url)
         .map_err(StoreError::InvalidUrl)?
         .create_if_missing(true)
         .foreign_keys(true)
         .busy_timeout(busy_timeout);
      if !in_memory {
         opts = opts
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
      }

      // Every pooled connection to an in-memory database would see its own
      // empty database, so pin exactly one.
      let pool_opts = if in_memory {
         SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
      } else {
         SqlitePoolOptions::new().max_connections(max_connections.max(1))
      };

      let pool = pool_opts
         .connect_with(opts)
         .await
         .map_err(StoreError::Connect)?;

      Ok(Self { pool, tables })
   }

   pub const fn pool(&self) -> &SqlitePool {
      &self.pool
   }

   pub const fn tables(&self) -> &TableNames {
      &self.tables
   }

   async fn apply_unit(
      &self,
      conn: &mut SqliteConnection,
      snapshot: &PlayerSnapshot,
      raw_json: &str,
      stamp: &str,
   ) -> Result<PlayerOutcome, StoreError> {
      let id = snapshot.player_id.as_str();

      // Write first so the transaction takes the write lock before any read.
      let new_player = upsert_player(conn, id, snapshot.display_name.as_deref(), stamp).await?;
      write_raw(conn, &self.tables.raw, id, raw_json, stamp).await?;

      let mut persisted = NormalizedStats::default();
      for category in Category::ALL {
         let table = self.tables.category(category);
         *persisted.get_mut(category) = read_category(conn, table, id).await?;
      }

      let plan = reconcile::plan_player(&snapshot.stats, &persisted);
      for (category, category_plan) in plan.iter() {
         if !category_plan.is_empty() {
            apply_category(conn, self.tables.category(category), id, category_plan, stamp).await?;
         }
      }

      Ok(PlayerOutcome { new_player, changes: plan.counts() })
   }
}

#[async_trait]
impl StatStore for SqliteStore {
   async fn ensure_schema(&self) -> Result<(), StoreError> {
      let mut tx = self.pool.begin().await.map_err(StoreError::Begin)?;

      let players_ddl = format!(
         "CREATE TABLE IF NOT EXISTS {PLAYERS_TABLE} (
            uuid TEXT PRIMARY KEY NOT NULL,
            name TEXT,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
         )"
      );
      let players_indexes = [format!(
         "CREATE INDEX IF NOT EXISTS idx_{PLAYERS_TABLE}_name ON {PLAYERS_TABLE} (name)"
      )];
      ensure_table(&mut tx, PLAYERS_TABLE, &players_ddl, PLAYER_COLUMNS, &players_indexes).await?;

      let raw = &self.tables.raw;
      let raw_ddl = format!(
         "CREATE TABLE IF NOT EXISTS {target} (
            uuid TEXT PRIMARY KEY NOT NULL
               REFERENCES {PLAYERS_TABLE} (uuid) ON DELETE CASCADE ON UPDATE CASCADE,
            raw_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
         )",
         target = quoted(raw)
      );
      ensure_table(&mut tx, raw, &raw_ddl, RAW_COLUMNS, &[]).await?;

      for category in Category::ALL {
         let table = self.tables.category(category);
         let target = quoted(table);
         let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {target} (
               uuid TEXT NOT NULL
                  REFERENCES {PLAYERS_TABLE} (uuid) ON DELETE CASCADE ON UPDATE CASCADE,
               stat_key TEXT NOT NULL,
               stat_value INTEGER NOT NULL,
               updated_at TEXT NOT NULL,
               PRIMARY KEY (uuid, stat_key)
            )"
         );
         let indexes = [
            format!(
               "CREATE INDEX IF NOT EXISTS {} ON {target} (stat_key)",
               quoted(&format!("idx_{table}_stat_key"))
            ),
            format!(
               "CREATE INDEX IF NOT EXISTS {} ON {target} (stat_value)",
               quoted(&format!("idx_{table}_stat_value"))
            ),
         ];
         ensure_table(&mut tx, table, &ddl, CATEGORY_COLUMNS, &indexes).await?;
      }

      tx.commit().await.map_err(StoreError::Commit)
   }

   async fn health_check(&self) -> Result<(), StoreError> {
      sqlx::query("SELECT 1")
         .execute(&self.pool)
         .await
         .map_err(StoreError::HealthCheck)?;
      Ok(())
   }

   async fn sync_player(
      &self,
      snapshot: &PlayerSnapshot,
      sync_time: DateTime<Utc>,
      mode: ApplyMode,
   ) -> Result<PlayerOutcome, StoreError> {
      let stamp = timestamp(sync_time);
      let raw_json = serde_json::to_string(&snapshot.raw).map_err(StoreError::SerializeRaw)?;

      let mut tx = self.pool.begin().await.map_err(StoreError::Begin)?;
      let applied = self.apply_unit(&mut tx, snapshot, &raw_json, &stamp).await;

      match (applied, mode) {
         (Ok(outcome), ApplyMode::Commit) => {
            tx.commit().await.map_err(StoreError::Commit)?;
            Ok(outcome)
         },
         (Ok(outcome), ApplyMode::DryRun) => {
            rollback(tx, &snapshot.player_id).await;
            Ok(outcome)
         },
         (Err(err), _) => {
            rollback(tx, &snapshot.player_id).await;
            Err(err)
         },
      }
   }

   async fn table_counts(&self) -> Result<Vec<TableCount>, StoreError> {
      let tables = std::iter::once(PLAYERS_TABLE)
         .chain(self.tables.entries().map(|(_, name)| name))
         .map(str::to_string)
         .collect::<Vec<_>>();

      let mut counts = Vec::with_capacity(tables.len());
      for table in tables {
         let sql = format!("SELECT COUNT(*) FROM {}", quoted(&table));
         let rows: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| StoreError::CountRows { table: table.clone(), source })?;
         counts.push(TableCount { table, rows });
      }
      Ok(counts)
   }
}

async fn rollback(tx: Transaction<'static, Sqlite>, player: &PlayerId) {
   if let Err(e) = tx.rollback().await {
      tracing::warn!(player = %player, "rollback failed: {e}");
   }
}

async fn ensure_table(
   conn: &mut SqliteConnection,
   table: &str,
   ddl: &str,
   columns: &[(&str, &str)],
   indexes: &[String],
) -> Result<(), StoreError> {
   let schema_err = |source| StoreError::Schema { table: table.to_string(), source };

   sqlx::query(ddl)
      .execute(&mut *conn)
      .await
      .map_err(schema_err)?;

   // Tables created by older releases may predate some columns.
   let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
      .bind(table)
      .fetch_all(&mut *conn)
      .await
      .map_err(schema_err)?;
   for (column, definition) in columns {
      if existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
         continue;
      }
      tracing::info!(table, column, "adding missing column");
      let sql = format!("ALTER TABLE {} ADD COLUMN {definition}", quoted(table));
      sqlx::query(&sql)
         .execute(&mut *conn)
         .await
         .map_err(schema_err)?;
   }

   for index in indexes {
      sqlx::query(index)
         .execute(&mut *conn)
         .await
         .map_err(schema_err)?;
   }
   Ok(())
}

/// Returns true when the player row was created by this call.
async fn upsert_player(
   conn: &mut SqliteConnection,
   id: &str,
   name: Option<&str>,
   stamp: &str,
) -> Result<bool, StoreError> {
   let name = name.map(str::trim).filter(|n| !n.is_empty());

   let insert = format!(
      "INSERT INTO {PLAYERS_TABLE} (uuid, name, first_seen, last_seen) VALUES (?1, ?2, ?3, ?3)
       ON CONFLICT (uuid) DO NOTHING"
   );
   let created = sqlx::query(&insert)
      .bind(id)
      .bind(name)
      .bind(stamp)
      .execute(&mut *conn)
      .await
      .map_err(StoreError::UpsertPlayer)?
      .rows_affected()
      == 1;

   if !created {
      let update = format!(
         "UPDATE {PLAYERS_TABLE} SET name = COALESCE(?2, name), last_seen = ?3 WHERE uuid = ?1"
      );
      sqlx::query(&update)
         .bind(id)
         .bind(name)
         .bind(stamp)
         .execute(&mut *conn)
         .await
         .map_err(StoreError::UpsertPlayer)?;
   }

   Ok(created)
}

async fn write_raw(
   conn: &mut SqliteConnection,
   table: &str,
   id: &str,
   raw_json: &str,
   stamp: &str,
) -> Result<(), StoreError> {
   let target = quoted(table);
   let sql = format!(
      "INSERT INTO {target} (uuid, raw_json, updated_at) VALUES (?1, ?2, ?3)
       ON CONFLICT (uuid) DO UPDATE SET raw_json = excluded.raw_json, updated_at = excluded.updated_at"
   );
   sqlx::query(&sql)
      .bind(id)
      .bind(raw_json)
      .bind(stamp)
      .execute(&mut *conn)
      .await
      .map_err(StoreError::WriteRaw)?;
   Ok(())
}

async fn read_category(
   conn: &mut SqliteConnection,
   table: &str,
   id: &str,
) -> Result<crate::types::CategoryStats, StoreError> {
   let sql = format!("SELECT stat_key, stat_value FROM {} WHERE uuid = ?1", quoted(table));
   let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
      .bind(id)
      .fetch_all(&mut *conn)
      .await
      .map_err(|source| StoreError::ReadRows { table: table.to_string(), source })?;
   Ok(rows.into_iter().collect())
}

async fn apply_category(
   conn: &mut SqliteConnection,
   table: &str,
   id: &str,
   plan: &CategoryPlan,
   stamp: &str,
) -> Result<(), StoreError> {
   let write_err =
      |op: &'static str| move |source| StoreError::WriteRows { op, table: table.to_string(), source };
   let target = quoted(table);

   if !plan.delete.is_empty() {
      let sql = format!("DELETE FROM {target} WHERE uuid = ?1 AND stat_key = ?2");
      for key in &plan.delete {
         sqlx::query(&sql)
            .bind(id)
            .bind(key.as_str())
            .execute(&mut *conn)
            .await
            .map_err(write_err("delete"))?;
      }
   }

   for chunk in plan.insert.chunks(INSERT_BATCH_ROWS) {
      let mut builder: QueryBuilder<'_, Sqlite> =
         QueryBuilder::new(format!("INSERT INTO {target} (uuid, stat_key, stat_value, updated_at) "));
      builder.push_values(chunk, |mut row, (key, value)| {
         row.push_bind(id)
            .push_bind(key.as_str())
            .push_bind(*value)
            .push_bind(stamp);
      });
      builder
         .build()
         .execute(&mut *conn)
         .await
         .map_err(write_err("insert"))?;
   }

   if !plan.update.is_empty() {
      let sql = format!(
         "UPDATE {target} SET stat_value = ?3, updated_at = ?4 WHERE uuid = ?1 AND stat_key = ?2"
      );
      for (key, value) in &plan.update {
         sqlx::query(&sql)
            .bind(id)
            .bind(key.as_str())
            .bind(*value)
            .bind(stamp)
            .execute(&mut *conn)
            .await
            .map_err(write_err("update"))?;
      }
   }

   Ok(())
}
