use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DocumentError;

/// Stat key to value mapping for one player and one category.
pub type CategoryStats = BTreeMap<String, i64>;

/// One of the nine stat groupings the game server writes per player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
   Used,
   Mined,
   Broken,
   Custom,
   Killed,
   Crafted,
   Dropped,
   KilledBy,
   PickedUp,
}

impl Category {
   pub const COUNT: usize = 9;

   pub const ALL: [Self; Self::COUNT] = [
      Self::Used,
      Self::Mined,
      Self::Broken,
      Self::Custom,
      Self::Killed,
      Self::Crafted,
      Self::Dropped,
      Self::KilledBy,
      Self::PickedUp,
   ];

   /// Top-level key of this category inside a stats document.
   pub const fn document_key(self) -> &'static str {
      match self {
         Self::Used => "minecraft:used",
         Self::Mined => "minecraft:mined",
         Self::Broken => "minecraft:broken",
         Self::Custom => "minecraft:custom",
         Self::Killed => "minecraft:killed",
         Self::Crafted => "minecraft:crafted",
         Self::Dropped => "minecraft:dropped",
         Self::KilledBy => "minecraft:killed_by",
         Self::PickedUp => "minecraft:picked_up",
      }
   }

   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Used => "used",
         Self::Mined => "mined",
         Self::Broken => "broken",
         Self::Custom => "custom",
         Self::Killed => "killed",
         Self::Crafted => "crafted",
         Self::Dropped => "dropped",
         Self::KilledBy => "killed_by",
         Self::PickedUp => "picked_up",
      }
   }

   pub fn from_document_key(key: &str) -> Option<Self> {
      Self::ALL.into_iter().find(|c| c.document_key() == key)
   }

   pub const fn index(self) -> usize {
      self as usize
   }
}

impl fmt::Display for Category {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Canonical player identifier (lowercase hyphenated UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
   /// Parses a UUID in any accepted spelling into its canonical form.
   pub fn parse(raw: &str) -> Result<Self, DocumentError> {
      Uuid::parse_str(raw.trim())
         .map(|uuid| Self(uuid.hyphenated().to_string()))
         .map_err(|_| DocumentError::InvalidPlayerId(raw.to_string()))
   }

   pub fn as_str(&self) -> &str {
      &self.0
   }
}

impl fmt::Display for PlayerId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.0)
   }
}

/// The nine category mappings of one player's document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedStats {
   categories: [CategoryStats; Category::COUNT],
}

impl NormalizedStats {
   pub fn get(&self, category: Category) -> &CategoryStats {
      &self.categories[category.index()]
   }

   pub fn get_mut(&mut self, category: Category) -> &mut CategoryStats {
      &mut self.categories[category.index()]
   }

   pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryStats)> {
      Category::ALL.into_iter().zip(self.categories.iter())
   }

   pub fn total_keys(&self) -> usize {
      self.categories.iter().map(BTreeMap::len).sum()
   }
}

/// Why a single stat value was left out of the normalized output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
   NotAnInteger,
   Negative,
   OutOfRange,
   EmptyKey,
   KeyTooLong,
   CategoryNotAnObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedValue {
   pub category: Category,
   pub key:      String,
   pub reason:   SkipReason,
}

/// Everything the store needs to converge one player
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
   pub player_id:    PlayerId,
   pub display_name: Option<String>,
   pub raw:          serde_json::Value,
   pub stats:        NormalizedStats,
}

/// Whether a sync unit is committed or rolled back after planning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
   #[default]
   Commit,
   DryRun,
}

/// Row changes for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
   pub inserted: u64,
   pub updated:  u64,
   pub deleted:  u64,
}

impl CategoryCounts {
   pub const fn total(&self) -> u64 {
      self.inserted + self.updated + self.deleted
   }

   pub const fn add(&mut self, other: Self) {
      self.inserted += other.inserted;
      self.updated += other.updated;
      self.deleted += other.deleted;
   }
}

/// Result of one applied (or dry-run) sync unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerOutcome {
   pub new_player: bool,
   pub changes:    [CategoryCounts; Category::COUNT],
}

impl PlayerOutcome {
   pub fn changes_for(&self, category: Category) -> CategoryCounts {
      self.changes[category.index()]
   }

   pub fn total_changes(&self) -> u64 {
      self.changes.iter().map(CategoryCounts::total).sum()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn player_id_canonicalizes_spelling() {
      let id = PlayerId::parse("069A79F444E94726A5BEFCA90E38AAF5").unwrap();
      assert_eq!(id.as_str(), "069a79f4-44e9-4726-a5be-fca90e38aaf5");

      let id = PlayerId::parse(" 069a79f4-44e9-4726-a5be-fca90e38aaf5\n").unwrap();
      assert_eq!(id.to_string(), "069a79f4-44e9-4726-a5be-fca90e38aaf5");
   }

   #[test]
   fn player_id_rejects_garbage() {
      assert!(matches!(
         PlayerId::parse("abc-123"),
         Err(DocumentError::InvalidPlayerId(raw)) if raw == "abc-123"
      ));
      assert!(PlayerId::parse("").is_err());
   }

   #[test]
   fn categories_map_to_document_keys() {
      for category in Category::ALL {
         assert_eq!(Category::from_document_key(category.document_key()), Some(category));
      }
      assert_eq!(Category::from_document_key("minecraft:custom_extra"), None);
      assert_eq!(Category::from_document_key("killed_by"), None);
   }

   #[test]
   fn category_index_matches_all_order() {
      for (idx, category) in Category::ALL.into_iter().enumerate() {
         assert_eq!(category.index(), idx);
      }
   }

   #[test]
   fn normalized_stats_keeps_categories_apart() {
      let mut stats = NormalizedStats::default();
      stats.get_mut(Category::Mined).insert("minecraft:diamond_ore".into(), 3);
      stats.get_mut(Category::PickedUp).insert("minecraft:diamond_ore".into(), 7);

      assert_eq!(stats.get(Category::Mined)["minecraft:diamond_ore"], 3);
      assert_eq!(stats.get(Category::PickedUp)["minecraft:diamond_ore"], 7);
      assert!(stats.get(Category::Used).is_empty());
      assert_eq!(stats.total_keys(), 2);
   }
}
