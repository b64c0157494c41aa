use std::{io, path::PathBuf};

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for statsync.
///
/// Per-player problems ([`DocumentError`], most [`StoreError`]s) are caught by
/// the sync engine and recorded in the run summary; everything that reaches
/// `main` as an `Error` aborts the run.
#[derive(Debug, Error)]
pub enum Error {
   /// JSON serialization error (summary output).
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// TOML serialization error (effective config output).
   #[error("toml error: {0}")]
   Toml(#[from] toml::ser::Error),

   /// Configuration could not be loaded or failed validation.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// The document source could not produce a batch at all.
   #[error("source error: {0}")]
   Source(#[from] SourceError),

   /// Error in the relational store layer.
   #[error("store error: {0}")]
   Store(#[from] StoreError),

   /// The run was aborted part way (e.g. the store connection was lost).
   #[error("fatal: {reason}")]
   Fatal { reason: String },

   /// Error already reported to the user (summary printed).
   #[error("{message}")]
   Reported { message: String, exit_code: i32 },
}

impl Error {
   pub const EXIT_FATAL: i32 = 2;
   pub const EXIT_PARTIAL: i32 = 3;
   pub const EXIT_CANCELLED: i32 = 130;

   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Reported { exit_code, .. } => *exit_code,
         Self::Config(_) | Self::Source(_) | Self::Store(_) | Self::Fatal { .. } => {
            Self::EXIT_FATAL
         },
         _ => 1,
      }
   }

   /// Short stable label used in structured log lines.
   pub const fn kind(&self) -> &'static str {
      match self {
         Self::Json(_) => "json",
         Self::Toml(_) => "toml",
         Self::Config(_) => "config",
         Self::Source(_) => "source",
         Self::Store(_) => "store",
         Self::Fatal { .. } => "fatal",
         Self::Reported { .. } => "reported",
      }
   }
}

/// Errors scoped to a single player's document.
#[derive(Debug, Error)]
pub enum DocumentError {
   /// The stats file exists but could not be read.
   #[error("failed to read {}: {source}", .path.display())]
   Read {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// The stats file is not valid JSON.
   #[error("invalid json: {0}")]
   Parse(#[source] serde_json::Error),

   /// The document parsed but its root is not a JSON object.
   #[error("document root is not a json object")]
   NotAnObject,

   /// The player identifier is not a UUID.
   #[error("malformed player identifier {0:?}")]
   InvalidPlayerId(String),

   /// An earlier document in the batch already maps to the same player.
   #[error("duplicate document for player identifier {0:?}")]
   DuplicatePlayerId(String),

   /// The source knows the player but could not hand over a document.
   #[error("document unavailable: {0}")]
   Unavailable(String),
}

/// Errors that make a document source unable to produce any batch.
#[derive(Debug, Error)]
pub enum SourceError {
   #[error("stats directory not found: {path}", path = _0.display())]
   MissingStatsDir(PathBuf),

   #[error("failed to list stats directory {}: {source}", .path.display())]
   ListStatsDir {
      path:   PathBuf,
      #[source]
      source: walkdir::Error,
   },

   #[error("document source unavailable: {0}")]
   Unavailable(String),

   #[error("directory listing task failed: {0}")]
   Join(#[from] tokio::task::JoinError),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// An explicitly requested config file does not exist.
   #[error("config file not found: {path}", path = _0.display())]
   NotFound(PathBuf),

   /// The layered config could not be extracted.
   #[error("failed to load config: {0}")]
   Load(#[from] Box<figment::Error>),

   /// A table name is not a plain SQL identifier.
   #[error("invalid table name for {key}: {name:?}")]
   InvalidTableName { key: &'static str, name: String },

   /// Two configured tables share a name.
   #[error("table name {0:?} is used more than once")]
   DuplicateTableName(String),

   /// A scalar setting is out of range.
   #[error("invalid value for {key}: {reason}")]
   InvalidValue { key: &'static str, reason: String },
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
