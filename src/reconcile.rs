//! Three-way diff between a player's current stats and what the store holds.
//!
//! Pure functions only: the store feeds persisted rows in and applies the
//! resulting plan inside its own transaction.

use std::cmp::Ordering;

use crate::types::{Category, CategoryCounts, CategoryStats, NormalizedStats};

/// Insert/update/delete sets for one player and one category.
///
/// The three key sets are disjoint and each is sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPlan {
   pub insert: Vec<(String, i64)>,
   pub update: Vec<(String, i64)>,
   pub delete: Vec<String>,
}

impl CategoryPlan {
   pub fn is_empty(&self) -> bool {
      self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
   }

   pub fn counts(&self) -> CategoryCounts {
      CategoryCounts {
         inserted: self.insert.len() as u64,
         updated:  self.update.len() as u64,
         deleted:  self.delete.len() as u64,
      }
   }

   /// Applies the plan to an in-memory copy of the persisted rows.
   pub fn apply_to(&self, persisted: &mut CategoryStats) {
      for key in &self.delete {
         persisted.remove(key);
      }
      for (key, value) in self.insert.iter().chain(&self.update) {
         persisted.insert(key.clone(), *value);
      }
   }
}

/// Plans for all nine categories of one player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerPlan {
   plans: [CategoryPlan; Category::COUNT],
}

impl PlayerPlan {
   pub fn get(&self, category: Category) -> &CategoryPlan {
      &self.plans[category.index()]
   }

   pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryPlan)> {
      Category::ALL.into_iter().zip(self.plans.iter())
   }

   pub fn is_empty(&self) -> bool {
      self.plans.iter().all(CategoryPlan::is_empty)
   }

   pub fn counts(&self) -> [CategoryCounts; Category::COUNT] {
      Category::ALL.map(|c| self.get(c).counts())
   }
}

/// Diffs one category. Equal values produce no write.
pub fn plan_category(current: &CategoryStats, persisted: &CategoryStats) -> CategoryPlan {
   let mut plan = CategoryPlan::default();
   let mut cur_iter = current.iter();
   let mut old_iter = persisted.iter();
   let mut cur = cur_iter.next();
   let mut old = old_iter.next();

   // Both maps iterate in key order, so one merge pass classifies every key.
   loop {
      match (cur, old) {
         (None, None) => break,
         (Some((key, value)), None) => {
            plan.insert.push((key.clone(), *value));
            cur = cur_iter.next();
         },
         (None, Some((key, _))) => {
            plan.delete.push(key.clone());
            old = old_iter.next();
         },
         (Some((key, value)), Some((old_key, old_value))) => match key.cmp(old_key) {
            Ordering::Less => {
               plan.insert.push((key.clone(), *value));
               cur = cur_iter.next();
            },
            Ordering::Greater => {
               plan.delete.push(old_key.clone());
               old = old_iter.next();
            },
            Ordering::Equal => {
               if value != old_value {
                  plan.update.push((key.clone(), *value));
               }
               cur = cur_iter.next();
               old = old_iter.next();
            },
         },
      }
   }

   plan
}

/// Diffs every category independently; keys never cross categories.
pub fn plan_player(current: &NormalizedStats, persisted: &NormalizedStats) -> PlayerPlan {
   PlayerPlan {
      plans: Category::ALL.map(|c| plan_category(current.get(c), persisted.get(c))),
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn stats(pairs: &[(&str, i64)]) -> CategoryStats {
      pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
   }

   #[test]
   fn updates_changed_and_inserts_new_keys() {
      let persisted = stats(&[("minecraft:stone", 50)]);
      let current = stats(&[("minecraft:stone", 75), ("minecraft:dirt", 10)]);

      let plan = plan_category(&current, &persisted);
      assert_eq!(plan.update, vec![("minecraft:stone".to_string(), 75)]);
      assert_eq!(plan.insert, vec![("minecraft:dirt".to_string(), 10)]);
      assert!(plan.delete.is_empty());
   }

   #[test]
   fn empty_category_deletes_everything() {
      let persisted = stats(&[("minecraft:zombie", 5), ("minecraft:skeleton", 2)]);
      let plan = plan_category(&CategoryStats::new(), &persisted);

      assert!(plan.insert.is_empty());
      assert!(plan.update.is_empty());
      assert_eq!(plan.delete, vec!["minecraft:skeleton".to_string(), "minecraft:zombie".to_string()]);
   }

   #[test]
   fn equal_values_are_a_no_op() {
      let rows = stats(&[("minecraft:jump", 9), ("minecraft:walk_one_cm", 120_000)]);
      let plan = plan_category(&rows, &rows);
      assert!(plan.is_empty());
      assert_eq!(plan.counts().total(), 0);
   }

   #[test]
   fn interleaved_keys_are_classified() {
      let persisted = stats(&[("b", 1), ("d", 4), ("f", 6)]);
      let current = stats(&[("a", 1), ("b", 2), ("d", 4), ("e", 5)]);

      let plan = plan_category(&current, &persisted);
      assert_eq!(plan.insert, vec![("a".to_string(), 1), ("e".to_string(), 5)]);
      assert_eq!(plan.update, vec![("b".to_string(), 2)]);
      assert_eq!(plan.delete, vec!["f".to_string()]);

      let mut applied = persisted.clone();
      plan.apply_to(&mut applied);
      assert_eq!(applied, current);
   }

   #[test]
   fn categories_do_not_share_keys() {
      let mut persisted = NormalizedStats::default();
      persisted.get_mut(Category::Mined).insert("minecraft:diamond_ore".into(), 3);

      let mut current = NormalizedStats::default();
      current.get_mut(Category::PickedUp).insert("minecraft:diamond_ore".into(), 3);

      let plan = plan_player(&current, &persisted);
      assert_eq!(plan.get(Category::Mined).delete, vec!["minecraft:diamond_ore".to_string()]);
      assert_eq!(plan.get(Category::PickedUp).insert.len(), 1);
      assert!(plan.get(Category::PickedUp).update.is_empty());

      let counts = plan.counts();
      assert_eq!(counts[Category::Mined.index()].deleted, 1);
      assert_eq!(counts[Category::PickedUp.index()].inserted, 1);
      assert_eq!(counts.iter().map(CategoryCounts::total).sum::<u64>(), 2);
   }

   #[test]
   fn identical_snapshots_give_empty_player_plan() {
      let mut snapshot = NormalizedStats::default();
      snapshot.get_mut(Category::Custom).insert("minecraft:play_time".into(), 72_000);
      assert!(plan_player(&snapshot, &snapshot).is_empty());
   }
}
