mod support;

use std::{fs, path::Path};

use serde_json::json;
use statsync::{
   Error,
   error::{DocumentError, SourceError},
   source::{DocumentSource, LocalSource},
   sync::{SyncEngine, SyncOptions},
   types::Category,
};
use support::{ALICE, BOB, CAROL, at, category_rows, player_row, temp_store};
use tempfile::TempDir;

/// Lays out `<root>/world/stats` and returns `(world, stats)`.
fn world(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
   let world = root.join("world");
   let stats = world.join("stats");
   fs::create_dir_all(&stats).unwrap();
   (world, stats)
}

#[tokio::test]
async fn reads_json_files_sorted_by_name() {
   let tmp = TempDir::new().unwrap();
   let (world, stats) = world(tmp.path());
   fs::write(stats.join(format!("{BOB}.json")), r#"{"stats":{}}"#).unwrap();
   fs::write(stats.join(format!("{ALICE}.json")), r#"{"stats":{}}"#).unwrap();
   fs::write(stats.join("notes.txt"), "ignored").unwrap();
   fs::create_dir(stats.join("nested")).unwrap();
   fs::write(stats.join("nested").join(format!("{CAROL}.json")), "{}").unwrap();

   let source = LocalSource::new(&stats, world.parent().unwrap().join("usercache.json"));
   let entries = source.fetch_all().await.unwrap();

   let ids: Vec<&str> = entries.iter().map(|e| e.player_id.as_str()).collect();
   assert_eq!(ids, vec![ALICE, BOB]);
   assert!(entries.iter().all(|e| e.document.is_ok()));
}

#[tokio::test]
async fn unparsable_file_is_a_per_player_error() {
   let tmp = TempDir::new().unwrap();
   let (_, stats) = world(tmp.path());
   fs::write(stats.join(format!("{ALICE}.json")), "{ truncated").unwrap();
   fs::write(stats.join(format!("{BOB}.json")), "{}").unwrap();

   let source = LocalSource::new(&stats, tmp.path().join("usercache.json"));
   let entries = source.fetch_all().await.unwrap();

   assert_eq!(entries.len(), 2);
   assert!(matches!(entries[0].document, Err(DocumentError::Parse(_))));
   assert!(entries[1].document.is_ok());
}

#[tokio::test]
async fn missing_stats_dir_fails_the_batch() {
   let tmp = TempDir::new().unwrap();
   let source = LocalSource::new(tmp.path().join("world/stats"), tmp.path().join("usercache.json"));

   let err = source.fetch_all().await.unwrap_err();
   assert!(matches!(err, Error::Source(SourceError::MissingStatsDir(_))));
}

#[tokio::test]
async fn empty_stats_dir_yields_empty_batch() {
   let tmp = TempDir::new().unwrap();
   let (_, stats) = world(tmp.path());
   let source = LocalSource::new(&stats, tmp.path().join("usercache.json"));
   assert!(source.fetch_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn usercache_maps_ids_to_names() {
   let tmp = TempDir::new().unwrap();
   let (_, stats) = world(tmp.path());
   let usercache = tmp.path().join("usercache.json");
   fs::write(
      &usercache,
      json!([
         { "name": "Alice", "uuid": ALICE, "expiresOn": "2026-11-18 09:00:00 +0000" },
         { "uuid": BOB },
      ])
      .to_string(),
   )
   .unwrap();

   let names = LocalSource::new(&stats, &usercache).fetch_directory().await.unwrap();
   assert_eq!(names.len(), 1);
   assert_eq!(names[ALICE], "Alice");
}

#[tokio::test]
async fn missing_or_malformed_usercache_is_empty() {
   let tmp = TempDir::new().unwrap();
   let (_, stats) = world(tmp.path());
   let usercache = tmp.path().join("usercache.json");

   let source = LocalSource::new(&stats, &usercache);
   assert!(source.fetch_directory().await.unwrap().is_empty());

   fs::write(&usercache, "{\"not\": \"a list\"}").unwrap();
   assert!(source.fetch_directory().await.unwrap().is_empty());
}

#[tokio::test]
async fn world_directory_syncs_end_to_end() {
   let tmp = TempDir::new().unwrap();
   let (world, stats) = world(tmp.path());
   fs::write(
      stats.join(format!("{ALICE}.json")),
      json!({
         "stats": {
            "minecraft:mined": { "minecraft:stone": 75, "minecraft:dirt": 10 },
            "minecraft:custom_extra": { "minecraft:anything": 1 }
         },
         "DataVersion": 3955
      })
      .to_string(),
   )
   .unwrap();
   fs::write(stats.join(format!("{BOB}.json")), "not json").unwrap();
   fs::write(
      tmp.path().join("usercache.json"),
      json!([{ "name": "Alice", "uuid": ALICE }]).to_string(),
   )
   .unwrap();

   let cfg = statsync::config::Config { world_path: world, ..Default::default() };
   let db = temp_store().await;
   let engine = SyncEngine::new(LocalSource::from_config(&cfg), db.store.clone());

   let summary = engine
      .run(&SyncOptions::from_config(&cfg), at(0), &mut ())
      .await
      .unwrap();

   assert_eq!(summary.processed, 1);
   assert_eq!(summary.failed, 1);
   assert_eq!(summary.failures[0].player_id, BOB);

   let mined = category_rows(&db.store, Category::Mined, ALICE).await;
   assert_eq!(mined.len(), 2);
   assert_eq!(mined["minecraft:stone"], 75);
   assert_eq!(player_row(&db.store, ALICE).await.unwrap().0.as_deref(), Some("Alice"));
}
