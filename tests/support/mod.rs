#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use statsync::{
   config::TableNames,
   normalize::normalize,
   store::{SqliteStore, StatStore},
   types::{Category, CategoryStats, PlayerId, PlayerSnapshot},
};
use tempfile::TempDir;

pub const ALICE: &str = "069a79f4-44e9-4726-a5be-fca90e38aaf5";
pub const BOB: &str = "853c80ef-3c37-49fd-aa49-938b674adae6";
pub const CAROL: &str = "61699b2e-d327-4a01-9f1e-0ea8c3f06bc6";

/// Scratch database file that lives as long as the value.
pub struct TestDb {
   pub dir:   TempDir,
   pub store: SqliteStore,
}

pub async fn temp_store() -> TestDb {
   temp_store_with(TableNames::default()).await
}

pub async fn temp_store_with(tables: TableNames) -> TestDb {
   let dir = TempDir::new().expect("temp dir");
   let url = format!("sqlite://{}", dir.path().join("stats.db").display());
   let store = SqliteStore::connect_with(&url, 4, Duration::from_secs(5), tables)
      .await
      .expect("connect");
   store.ensure_schema().await.expect("schema");
   TestDb { dir, store }
}

/// Fixed sync time `secs` seconds after a constant epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
   Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn snapshot(player: &str, name: Option<&str>, document: Value) -> PlayerSnapshot {
   let normalized = normalize(&document).expect("normalize");
   PlayerSnapshot {
      player_id:    PlayerId::parse(player).expect("player id"),
      display_name: name.map(str::to_string),
      raw:          document,
      stats:        normalized.stats,
   }
}

pub async fn category_rows(store: &SqliteStore, category: Category, player: &str) -> CategoryStats {
   let sql = format!(
      "SELECT stat_key, stat_value FROM \"{}\" WHERE uuid = ?1",
      store.tables().category(category)
   );
   let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
      .bind(player)
      .fetch_all(store.pool())
      .await
      .expect("category rows");
   rows.into_iter().collect()
}

/// `(name, first_seen, last_seen)` of a registered player.
pub async fn player_row(
   store: &SqliteStore,
   player: &str,
) -> Option<(Option<String>, String, String)> {
   sqlx::query_as("SELECT name, first_seen, last_seen FROM players WHERE uuid = ?1")
      .bind(player)
      .fetch_optional(store.pool())
      .await
      .expect("player row")
}

pub async fn raw_row(store: &SqliteStore, player: &str) -> Option<(String, String)> {
   let sql = format!("SELECT raw_json, updated_at FROM \"{}\" WHERE uuid = ?1", store.tables().raw);
   sqlx::query_as(&sql)
      .bind(player)
      .fetch_optional(store.pool())
      .await
      .expect("raw row")
}

pub async fn row_count(store: &SqliteStore, table: &str) -> i64 {
   sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
      .fetch_one(store.pool())
      .await
      .expect("count")
}
