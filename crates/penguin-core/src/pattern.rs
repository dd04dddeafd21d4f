//! Drop-pattern canonicalization.
//!
//! A pattern is the multiset of `(item, quantity)` produced by one clear. Two
//! clears share a pattern exactly when their merged `item → quantity` maps are
//! equal, regardless of drop order or how the drops were split across types.
//!
//! The fingerprint is `"<itemId>:<quantity>"` segments sorted by byte order and
//! joined with `|`; the hash is the seedless XXH64 of the fingerprint in
//! lowercase hex without padding. Both are persisted, so neither format may
//! change without migrating the `drop_patterns` table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternElement {
  pub item_id:  i64,
  pub quantity: i64,
}

/// The canonical form of a drop list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPattern {
  pub fingerprint: String,
  pub hash:        String,
  /// One element per distinct item, in fingerprint order.
  pub elements:    Vec<PatternElement>,
}

/// A persisted pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropPattern {
  pub pattern_id:           i64,
  pub hash:                 String,
  pub original_fingerprint: String,
}

/// Canonicalize `(item_id, quantity)` pairs.
pub fn canonicalize<I>(drops: I) -> CanonicalPattern
where
  I: IntoIterator<Item = (i64, i64)>,
{
  let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
  for (item_id, quantity) in drops {
    *merged.entry(item_id).or_default() += quantity;
  }

  let mut segments: Vec<(String, PatternElement)> = merged
    .into_iter()
    .map(|(item_id, quantity)| {
      (format!("{item_id}:{quantity}"), PatternElement { item_id, quantity })
    })
    .collect();
  segments.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

  let fingerprint = segments
    .iter()
    .map(|(s, _)| s.as_str())
    .collect::<Vec<_>>()
    .join("|");
  let hash = fingerprint_hash(&fingerprint);
  let elements = segments.into_iter().map(|(_, e)| e).collect();

  CanonicalPattern { fingerprint, hash, elements }
}

/// Seedless XXH64 of `fingerprint`, lowercase hex, no padding.
pub fn fingerprint_hash(fingerprint: &str) -> String {
  format!("{:x}", XxHash64::oneshot(0, fingerprint.as_bytes()))
}
