//! Configuration for store access, document paths, concurrency and table names.

use std::{
   collections::HashSet,
   path::{Path, PathBuf},
   sync::LazyLock,
   time::Duration,
};

use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
   error::{ConfigError, Result},
   types::Category,
};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "statsync.toml";
pub const ENV_PREFIX: &str = "STATSYNC_";
pub const PLAYERS_TABLE: &str = "players";

pub const MAX_WORKERS: usize = 64;
pub const MAX_TABLE_NAME_LEN: usize = 64;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Application configuration loaded from defaults, a TOML file and environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub world_path:     PathBuf,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub stats_dir:      Option<PathBuf>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub usercache_path: Option<PathBuf>,

   pub database_url:    String,
   pub max_connections: u32,
   pub busy_timeout_ms: u64,

   pub workers:           usize,
   pub deadline_secs:     u64,
   pub progress_interval: usize,

   pub tables: TableNames,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         world_path: PathBuf::from("world"),
         stats_dir: None,
         usercache_path: None,
         database_url: "sqlite://stats.db".to_string(),
         max_connections: 4,
         busy_timeout_ms: 5000,
         workers: 4,
         deadline_secs: 0,
         progress_interval: 50,
         tables: TableNames::default(),
      }
   }
}

/// Target table names, one per category plus the raw-document archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
   pub raw:       String,
   pub used:      String,
   pub mined:     String,
   pub broken:    String,
   pub custom:    String,
   pub killed:    String,
   pub crafted:   String,
   pub dropped:   String,
   pub killed_by: String,
   pub picked_up: String,
}

impl Default for TableNames {
   fn default() -> Self {
      Self {
         raw:       "player_stats".to_string(),
         used:      "player_stats_used".to_string(),
         mined:     "player_stats_mined".to_string(),
         broken:    "player_stats_broken".to_string(),
         custom:    "player_stats_custom".to_string(),
         killed:    "player_stats_killed".to_string(),
         crafted:   "player_stats_crafted".to_string(),
         dropped:   "player_stats_dropped".to_string(),
         killed_by: "player_stats_killed_by".to_string(),
         picked_up: "player_stats_picked_up".to_string(),
      }
   }
}

impl TableNames {
   pub fn category(&self, category: Category) -> &str {
      match category {
         Category::Used => &self.used,
         Category::Mined => &self.mined,
         Category::Broken => &self.broken,
         Category::Custom => &self.custom,
         Category::Killed => &self.killed,
         Category::Crafted => &self.crafted,
         Category::Dropped => &self.dropped,
         Category::KilledBy => &self.killed_by,
         Category::PickedUp => &self.picked_up,
      }
   }

   /// Config keys and values of every table, raw archive first.
   pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
      std::iter::once(("raw", self.raw.as_str()))
         .chain(Category::ALL.into_iter().map(|c| (c.as_str(), self.category(c))))
   }

   pub fn validate(&self) -> Result<()> {
      let mut seen = HashSet::new();
      seen.insert(PLAYERS_TABLE.to_string());

      for (key, name) in self.entries() {
         if name.len() > MAX_TABLE_NAME_LEN || !IDENTIFIER.is_match(name) {
            return Err(ConfigError::InvalidTableName { key, name: name.to_string() }.into());
         }
         if !seen.insert(name.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateTableName(name.to_string()).into());
         }
      }
      Ok(())
   }
}

impl Config {
   /// Loads configuration.
   ///
   /// An explicit `path` must exist; otherwise `statsync.toml` in the working
   /// directory is merged when present. `STATSYNC_*` variables override both,
   /// with `__` separating nested keys (`STATSYNC_TABLES__MINED`).
   pub fn load(path: Option<&Path>) -> Result<Self> {
      let file = match path {
         Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf()).into()),
         Some(p) => p.to_path_buf(),
         None => PathBuf::from(DEFAULT_CONFIG_FILE),
      };

      let figment = Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(file))
         .merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));
      Self::from_figment(&figment)
   }

   /// Extracts and validates a config from an already layered figment.
   pub fn from_figment(figment: &Figment) -> Result<Self> {
      let cfg: Self = figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))?;
      cfg.validate()?;
      Ok(cfg)
   }

   pub fn validate(&self) -> Result<()> {
      if self.database_url.trim().is_empty() {
         return Err(
            ConfigError::InvalidValue { key: "database_url", reason: "must not be empty".into() }
               .into(),
         );
      }
      if self.max_connections == 0 {
         return Err(
            ConfigError::InvalidValue { key: "max_connections", reason: "must be at least 1".into() }
               .into(),
         );
      }
      self.tables.validate()
   }

   pub fn stats_dir(&self) -> PathBuf {
      self
         .stats_dir
         .clone()
         .unwrap_or_else(|| self.world_path.join("stats"))
   }

   /// `usercache.json` lives next to the world directory, not inside it.
   pub fn usercache_path(&self) -> PathBuf {
      self.usercache_path.clone().unwrap_or_else(|| {
         self
            .world_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("usercache.json")
      })
   }

   pub fn effective_workers(&self) -> usize {
      self.workers.clamp(1, MAX_WORKERS)
   }

   pub const fn busy_timeout(&self) -> Duration {
      Duration::from_millis(self.busy_timeout_ms)
   }

   pub const fn deadline(&self) -> Option<Duration> {
      if self.deadline_secs == 0 {
         None
      } else {
         Some(Duration::from_secs(self.deadline_secs))
      }
   }

   pub fn progress_interval(&self) -> usize {
      self.progress_interval.max(1)
   }
}
