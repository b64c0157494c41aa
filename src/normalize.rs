//! Decomposes a raw per-player stats document into the nine category maps.
//!
//! Unknown categories are ignored and bad values are skipped one key at a
//! time, so a document written by a newer game release still syncs.

use serde_json::{Map, Value};

use crate::{
   error::DocumentError,
   types::{Category, CategoryStats, NormalizedStats, SkipReason, SkippedValue},
};

/// Longest stat key the store accepts.
pub const MAX_STAT_KEY_LEN: usize = 96;

/// Normalizer output: the typed rows plus every value that was dropped.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
   pub stats:   NormalizedStats,
   pub skipped: Vec<SkippedValue>,
}

/// Normalizes one stats document.
///
/// Accepts both the on-disk layout (`{"stats": {...}, "DataVersion": n}`)
/// and a bare category mapping.
pub fn normalize(document: &Value) -> Result<Normalized, DocumentError> {
   let root = document.as_object().ok_or(DocumentError::NotAnObject)?;
   let sections = match root.get("stats") {
      Some(Value::Object(stats)) => stats,
      _ => root,
   };

   let mut out = Normalized::default();
   for category in Category::ALL {
      let Some(raw) = sections.get(category.document_key()) else {
         continue;
      };
      match raw {
         Value::Object(values) => {
            normalize_category(category, values, out.stats.get_mut(category), &mut out.skipped);
         },
         _ => out.skipped.push(SkippedValue {
            category,
            key: "*".to_string(),
            reason: SkipReason::CategoryNotAnObject,
         }),
      }
   }

   Ok(out)
}

fn normalize_category(
   category: Category,
   values: &Map<String, Value>,
   into: &mut CategoryStats,
   skipped: &mut Vec<SkippedValue>,
) {
   for (key, value) in values {
      let parsed = check_key(key).and_then(|()| parse_value(value));
      match parsed {
         Ok(v) => {
            into.insert(key.clone(), v);
         },
         Err(reason) => skipped.push(SkippedValue { category, key: key.clone(), reason }),
      }
   }
}

fn check_key(key: &str) -> Result<(), SkipReason> {
   if key.trim().is_empty() {
      Err(SkipReason::EmptyKey)
   } else if key.chars().count() > MAX_STAT_KEY_LEN {
      Err(SkipReason::KeyTooLong)
   } else {
      Ok(())
   }
}

/// Accepts non-negative integers, integral floats and integer strings.
pub fn parse_value(value: &Value) -> Result<i64, SkipReason> {
   match value {
      Value::Number(n) => {
         if let Some(v) = n.as_i64() {
            return if v < 0 { Err(SkipReason::Negative) } else { Ok(v) };
         }
         if n.as_u64().is_some() {
            return Err(SkipReason::OutOfRange);
         }
         n.as_f64().map_or(Err(SkipReason::NotAnInteger), parse_float)
      },
      Value::String(s) => match s.trim().parse::<i64>() {
         Ok(v) if v < 0 => Err(SkipReason::Negative),
         Ok(v) => Ok(v),
         Err(_) if s.trim().parse::<u64>().is_ok() => Err(SkipReason::OutOfRange),
         Err(_) => Err(SkipReason::NotAnInteger),
      },
      _ => Err(SkipReason::NotAnInteger),
   }
}

fn parse_float(f: f64) -> Result<i64, SkipReason> {
   // i64::MAX is not representable; 2^63 is the first float past it.
   const LIMIT: f64 = 9_223_372_036_854_775_808.0;

   if !f.is_finite() || f.fract() != 0.0 {
      Err(SkipReason::NotAnInteger)
   } else if f < 0.0 {
      Err(SkipReason::Negative)
   } else if f >= LIMIT {
      Err(SkipReason::OutOfRange)
   } else {
      Ok(f as i64)
   }
}

#[cfg(test)]
mod tests {
   use serde_json::json;

   use super::*;

   #[test]
   fn reads_wrapped_server_layout() {
      let doc = json!({
         "stats": {
            "minecraft:mined": { "minecraft:stone": 75, "minecraft:dirt": 10 },
            "minecraft:custom": { "minecraft:jump": 412 }
         },
         "DataVersion": 3955
      });

      let out = normalize(&doc).unwrap();
      assert_eq!(out.stats.get(Category::Mined).len(), 2);
      assert_eq!(out.stats.get(Category::Mined)["minecraft:stone"], 75);
      assert_eq!(out.stats.get(Category::Custom)["minecraft:jump"], 412);
      assert!(out.stats.get(Category::Killed).is_empty());
      assert!(out.skipped.is_empty());
   }

   #[test]
   fn reads_bare_category_mapping() {
      let doc = json!({ "minecraft:killed": { "minecraft:zombie": 5 } });
      let out = normalize(&doc).unwrap();
      assert_eq!(out.stats.get(Category::Killed)["minecraft:zombie"], 5);
   }

   #[test]
   fn ignores_unknown_categories() {
      let doc = json!({
         "stats": {
            "minecraft:custom_extra": { "minecraft:anything": 1 },
            "minecraft:used": { "minecraft:torch": 4 }
         }
      });

      let out = normalize(&doc).unwrap();
      assert_eq!(out.stats.total_keys(), 1);
      assert!(out.skipped.is_empty());
   }

   #[test]
   fn skips_bad_values_without_dropping_neighbours() {
      let doc = json!({
         "stats": {
            "minecraft:crafted": {
               "minecraft:torch": 12,
               "minecraft:stick": "7",
               "minecraft:bread": 2.0,
               "minecraft:cake": 1.5,
               "minecraft:bow": -1,
               "minecraft:boat": null,
               "minecraft:map": true,
               "": 3
            }
         }
      });

      let out = normalize(&doc).unwrap();
      let crafted = out.stats.get(Category::Crafted);
      assert_eq!(crafted.len(), 3);
      assert_eq!(crafted["minecraft:torch"], 12);
      assert_eq!(crafted["minecraft:stick"], 7);
      assert_eq!(crafted["minecraft:bread"], 2);

      let reasons: Vec<(&str, SkipReason)> =
         out.skipped.iter().map(|s| (s.key.as_str(), s.reason)).collect();
      assert!(reasons.contains(&("minecraft:cake", SkipReason::NotAnInteger)));
      assert!(reasons.contains(&("minecraft:bow", SkipReason::Negative)));
      assert!(reasons.contains(&("minecraft:boat", SkipReason::NotAnInteger)));
      assert!(reasons.contains(&("minecraft:map", SkipReason::NotAnInteger)));
      assert!(reasons.contains(&("", SkipReason::EmptyKey)));
      assert_eq!(out.skipped.len(), 5);
   }

   #[test]
   fn rejects_values_beyond_signed_range() {
      assert_eq!(parse_value(&json!(u64::MAX)), Err(SkipReason::OutOfRange));
      assert_eq!(parse_value(&json!("18446744073709551615")), Err(SkipReason::OutOfRange));
      assert_eq!(parse_value(&json!(1e19)), Err(SkipReason::OutOfRange));
      assert_eq!(parse_value(&json!(i64::MAX)), Ok(i64::MAX));
   }

   #[test]
   fn rejects_overlong_keys() {
      let long_key = "k".repeat(MAX_STAT_KEY_LEN + 1);
      let mut used = Map::new();
      used.insert(long_key.clone(), json!(1));
      used.insert("minecraft:ok".to_string(), json!(2));
      let doc = json!({ "minecraft:used": used });

      let out = normalize(&doc).unwrap();
      assert_eq!(out.stats.get(Category::Used).len(), 1);
      assert_eq!(out.skipped[0].reason, SkipReason::KeyTooLong);
      assert_eq!(out.skipped[0].key, long_key);
   }

   #[test]
   fn non_object_category_yields_no_keys() {
      let doc = json!({ "stats": { "minecraft:mined": [1, 2, 3] } });
      let out = normalize(&doc).unwrap();
      assert!(out.stats.get(Category::Mined).is_empty());
      assert_eq!(out.skipped.len(), 1);
      assert_eq!(out.skipped[0].reason, SkipReason::CategoryNotAnObject);
   }

   #[test]
   fn non_object_document_is_a_document_error() {
      assert!(matches!(normalize(&json!([1, 2])), Err(DocumentError::NotAnObject)));
      assert!(matches!(normalize(&json!("stats")), Err(DocumentError::NotAnObject)));
   }
}
