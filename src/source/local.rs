//! Stats documents read from a world directory on local disk.

use std::{
   collections::HashMap,
   io,
   path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::{
   config::Config,
   error::{DocumentError, Result, SourceError},
   source::{DocumentSource, SourceEntry},
};

/// Reads `<stats_dir>/<uuid>.json` files and the server's `usercache.json`.
#[derive(Debug, Clone)]
pub struct LocalSource {
   stats_dir: PathBuf,
   usercache: PathBuf,
}

#[derive(Deserialize)]
struct UserCacheEntry {
   #[serde(default)]
   uuid: Option<String>,
   #[serde(default)]
   name: Option<String>,
}

impl LocalSource {
   pub fn new(stats_dir: impl Into<PathBuf>, usercache: impl Into<PathBuf>) -> Self {
      Self { stats_dir: stats_dir.into(), usercache: usercache.into() }
   }

   pub fn from_config(cfg: &Config) -> Self {
      Self::new(cfg.stats_dir(), cfg.usercache_path())
   }

   pub fn stats_dir(&self) -> &Path {
      &self.stats_dir
   }

   async fn list_documents(&self) -> Result<Vec<PathBuf>> {
      let dir = self.stats_dir.clone();
      let paths = tokio::task::spawn_blocking(move || list_json_files(&dir))
         .await
         .map_err(SourceError::Join)??;
      Ok(paths)
   }
}

fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
   if !dir.is_dir() {
      return Err(SourceError::MissingStatsDir(dir.to_path_buf()));
   }

   let mut paths = Vec::new();
   let walker = WalkDir::new(dir)
      .min_depth(1)
      .max_depth(1)
      .follow_links(true)
      .sort_by_file_name();
   for entry in walker {
      let entry =
         entry.map_err(|source| SourceError::ListStatsDir { path: dir.to_path_buf(), source })?;
      if !entry.file_type().is_file() {
         continue;
      }
      let path = entry.path();
      if path
         .extension()
         .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
      {
         paths.push(path.to_path_buf());
      }
   }
   Ok(paths)
}

async fn read_document(path: &Path) -> Result<serde_json::Value, DocumentError> {
   let bytes = tokio::fs::read(path)
      .await
      .map_err(|source| DocumentError::Read { path: path.to_path_buf(), source })?;
   serde_json::from_slice(&bytes).map_err(DocumentError::Parse)
}

#[async_trait]
impl DocumentSource for LocalSource {
   async fn fetch_all(&self) -> Result<Vec<SourceEntry>> {
      let paths = self.list_documents().await?;
      if paths.is_empty() {
         tracing::warn!(dir = %self.stats_dir.display(), "no stats documents found");
      }

      let mut entries = Vec::with_capacity(paths.len());
      for path in paths {
         let Some(stem) = path.file_stem() else {
            continue;
         };
         let player_id = stem.to_string_lossy().into_owned();
         let entry = match read_document(&path).await {
            Ok(document) => SourceEntry::ok(player_id, document),
            Err(e) => SourceEntry::failed(player_id, e),
         };
         entries.push(entry);
      }
      Ok(entries)
   }

   async fn fetch_directory(&self) -> Result<HashMap<String, String>> {
      let bytes = match tokio::fs::read(&self.usercache).await {
         Ok(bytes) => bytes,
         Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %self.usercache.display(), "no usercache, names stay unset");
            return Ok(HashMap::new());
         },
         Err(e) => {
            tracing::warn!(path = %self.usercache.display(), "failed to read usercache: {e}");
            return Ok(HashMap::new());
         },
      };

      let entries: Vec<UserCacheEntry> = match serde_json::from_slice(&bytes) {
         Ok(entries) => entries,
         Err(e) => {
            tracing::warn!(path = %self.usercache.display(), "ignoring malformed usercache: {e}");
            return Ok(HashMap::new());
         },
      };

      Ok(entries
         .into_iter()
         .filter_map(|entry| Some((entry.uuid?, entry.name?)))
         .collect())
   }
}
