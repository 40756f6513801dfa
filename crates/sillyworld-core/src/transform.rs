//! Structural slimming of raw state snapshots.
//!
//! The game's state document is large and full of fields that are useless
//! to a language model (internal def names, tick counters, fine-grained
//! stat multipliers). [`SnapshotTransform`] strips those, shortens long
//! summaries, deduplicates repeated list items, and drops containers left
//! empty. The free-text universal lorebook is lifted out of the root and
//! returned separately.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

/// Root key holding free-text lore written by the player.
pub const UNIVERSAL_LOREBOOK_KEY: &str = "UniversalLorebook";

/// Marker appended to truncated strings.
const ELLIPSIS: &str = "...";

/// Fields removed wherever they appear.
const REMOVED_FIELDS: &[&str] = &[
    "DefName",
    "ModName",
    "Type",
    "GameTicks",
    "Id",
    "XenotypeName",
    "Beauty",
    "AgeTicks",
    "MoodEffect",
    "Degree",
    "Issue",
    "Impact",
    "MassUsage",
    "MassCapacity",
    "PowerOutput",
    "PowerConsumption",
    "IsFueled",
    "Resistance",
    "Will",
    "Entropy",
    "Psyfocus",
    "BandwidthTotal",
    "BandwidthUsed",
    "Learning",
    "Favor",
    "阅读加成",
    "感染几率系数",
    "手术成功几率清洁系数",
    "研究速度系数",
    "扫墓娱乐系数",
    "食物有毒几率",
    "塑形舱速度系数",
    "工作速度系数",
];

/// Arrays deduplicated by the listed identity fields. An empty list means
/// the array holds scalars compared by value.
const DEDUP_KEYS: &[(&str, &[&str])] = &[
    ("Precepts", &["Label"]),
    ("ContainedBuildings", &["Name"]),
    ("PlayerPawns", &["FullName"]),
    ("HostilePawns", &["FullName"]),
    ("FriendlyPawns", &["FullName"]),
    ("Memes", &[]),
    ("SpecialGenes", &["Label"]),
    ("Xenogenes", &["Label"]),
];

/// Rules driving [`SnapshotTransform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRules {
    /// Keys deleted at every depth.
    pub remove: BTreeSet<String>,
    /// Keys deleted at every depth whose string values become keywords.
    pub promote: BTreeSet<String>,
    /// Maximum character length per string field.
    pub truncate: BTreeMap<String, usize>,
    /// Identity fields per array key.
    pub dedup: BTreeMap<String, Vec<String>>,
}

impl Default for TransformRules {
    fn default() -> Self {
        Self {
            remove: REMOVED_FIELDS.iter().map(|&f| f.to_owned()).collect(),
            promote: BTreeSet::new(),
            truncate: BTreeMap::from([("Summary".to_owned(), 150)]),
            dedup: DEDUP_KEYS
                .iter()
                .map(|&(key, ids)| (key.to_owned(), ids.iter().map(|&i| i.to_owned()).collect()))
                .collect(),
        }
    }
}

/// Output of [`SnapshotTransform::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedSnapshot {
    /// The slimmed document.
    pub slimmed: Value,
    /// Keywords collected from promoted fields, in first-seen order.
    pub keywords: Vec<String>,
    /// The universal lorebook text, if the document carried one.
    pub universal_lore: Option<String>,
}

/// Slims raw state documents according to [`TransformRules`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotTransform {
    rules: TransformRules,
}

impl SnapshotTransform {
    /// Create a transform with the given rules.
    pub const fn new(rules: TransformRules) -> Self {
        Self { rules }
    }

    /// The rules in effect.
    pub const fn rules(&self) -> &TransformRules {
        &self.rules
    }

    /// Slim a document. The input is left untouched.
    pub fn apply(&self, doc: &Value) -> TransformedSnapshot {
        let mut slimmed = doc.clone();
        let universal_lore = slimmed
            .as_object_mut()
            .and_then(|root| root.remove(UNIVERSAL_LOREBOOK_KEY))
            .and_then(lore_text);
        let mut keywords = Vec::new();
        self.slim(&mut slimmed, &mut keywords);
        TransformedSnapshot {
            slimmed,
            keywords,
            universal_lore,
        }
    }

    fn slim(&self, value: &mut Value, keywords: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                let fields = std::mem::take(map);
                *map = self.slim_object(fields, keywords);
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.slim(item, keywords);
                }
                items.retain(|item| !is_empty_container(item));
            }
            _ => {}
        }
    }

    fn slim_object(&self, fields: Map<String, Value>, keywords: &mut Vec<String>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, mut child) in fields {
            if self.rules.remove.contains(&key) {
                continue;
            }
            if self.rules.promote.contains(&key) {
                if let Some(text) = child.as_str().filter(|t| !t.is_empty()) {
                    if !keywords.iter().any(|k| k == text) {
                        keywords.push(text.to_owned());
                    }
                }
                continue;
            }
            if let (Some(&limit), Value::String(text)) = (self.rules.truncate.get(&key), &mut child) {
                truncate(text, limit);
            }
            self.slim(&mut child, keywords);
            if let (Some(ids), Value::Array(items)) = (self.rules.dedup.get(&key), &mut child) {
                dedup(items, ids);
            }
            if !is_empty_container(&child) {
                out.insert(key, child);
            }
        }
        out
    }
}

fn lore_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text),
        other => serde_json::to_string_pretty(&other).ok(),
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn truncate(text: &mut String, limit: usize) {
    if let Some((cut, _)) = text.char_indices().nth(limit) {
        text.truncate(cut);
        text.push_str(ELLIPSIS);
    }
}

fn identity(item: &Value, ids: &[String]) -> String {
    if ids.is_empty() {
        return item.to_string();
    }
    ids.iter()
        .map(|id| match item.get(id) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("||")
}

fn dedup(items: &mut Vec<Value>, ids: &[String]) {
    let mut seen = BTreeSet::new();
    items.retain(|item| {
        if !ids.is_empty() && !item.is_object() {
            return true;
        }
        seen.insert(identity(item, ids))
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn removes_listed_fields_at_any_depth() {
        let doc = json!({
            "DefName": "root",
            "Map": {"Biome": "Tundra", "Id": 7, "Things": [{"DefName": "x", "Label": "Wall"}]}
        });
        let out = SnapshotTransform::default().apply(&doc);
        assert_eq!(
            out.slimmed,
            json!({"Map": {"Biome": "Tundra", "Things": [{"Label": "Wall"}]}})
        );
    }

    #[test]
    fn prunes_containers_left_empty() {
        let doc = json!({"A": {"Id": 1}, "B": [{"DefName": "x"}], "C": [], "D": 0});
        let out = SnapshotTransform::default().apply(&doc);
        assert_eq!(out.slimmed, json!({"D": 0}));
    }

    #[test]
    fn truncates_long_summaries() {
        let long: String = "字".repeat(200);
        let doc = json!({"Scenario": {"Summary": long}});
        let out = SnapshotTransform::default().apply(&doc);
        let summary = out.slimmed["Scenario"]["Summary"].as_str().unwrap();
        assert_eq!(summary.chars().count(), 153);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn short_summaries_are_kept() {
        let doc = json!({"Summary": "short"});
        let out = SnapshotTransform::default().apply(&doc);
        assert_eq!(out.slimmed["Summary"], "short");
    }

    #[test]
    fn deduplicates_by_identity_keys() {
        let doc = json!({
            "PlayerPawns": [{"FullName": "Jane", "Age": 30}, {"FullName": "Jane", "Age": 31}, {"FullName": "Bob"}],
            "Memes": ["Collectivist", "Collectivist", "Loyalist"]
        });
        let out = SnapshotTransform::default().apply(&doc);
        assert_eq!(out.slimmed["PlayerPawns"].as_array().unwrap().len(), 2);
        assert_eq!(out.slimmed["Memes"], json!(["Collectivist", "Loyalist"]));
    }

    #[test]
    fn lifts_universal_lorebook() {
        let doc = json!({"UniversalLorebook": "The rim is vast.", "TimeOfDay": "Morning"});
        let out = SnapshotTransform::default().apply(&doc);
        assert_eq!(out.universal_lore.as_deref(), Some("The rim is vast."));
        assert_eq!(out.slimmed, json!({"TimeOfDay": "Morning"}));
    }

    #[test]
    fn promoted_fields_become_keywords() {
        let mut rules = TransformRules::default();
        rules.promote.insert("Nickname".to_owned());
        let doc = json!({"Pawns": [{"Nickname": "Ace", "Age": 3}, {"Nickname": "Ace"}]});
        let out = SnapshotTransform::new(rules).apply(&doc);
        assert_eq!(out.keywords, vec!["Ace".to_owned()]);
        assert_eq!(out.slimmed, json!({"Pawns": [{"Age": 3}]}));
    }

    #[test]
    fn input_is_not_mutated() {
        let doc = json!({"Id": 1, "Name": "x"});
        let _ = SnapshotTransform::default().apply(&doc);
        assert_eq!(doc["Id"], 1);
    }
}
