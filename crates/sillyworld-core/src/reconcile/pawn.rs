//! Pawn entries: one entry per pawn, prefixed by the pawn's standing.
//!
//! Colonists come from the `PlayerPawns` roster and get `[Pawn]`. Pawns in
//! the current map's groups get `[Hostile]` when their relation to the
//! player is hostile and `[Friendly]` otherwise. A pawn listed in both
//! places takes the group prefix.

use std::collections::BTreeMap;

use serde_json::Value;
use sillyworld_types::{EntryUpsert, UpsertOptions, entry_name};

/// Prefix for colonists.
pub const PAWN_PREFIX: &str = "[Pawn]";
/// Prefix for non-hostile visitors on the map.
pub const FRIENDLY_PREFIX: &str = "[Friendly]";
/// Prefix for hostile pawns on the map.
pub const HOSTILE_PREFIX: &str = "[Hostile]";

/// Every prefix owned by the pawn category.
pub const PAWN_PREFIXES: [&str; 3] = [PAWN_PREFIX, FRIENDLY_PREFIX, HOSTILE_PREFIX];

/// English role/relation names and their Chinese glosses, added to pawn
/// keywords so either language triggers the entry.
const GLOSSES: &[(&str, &str)] = &[
    ("Hostile", "敌对"),
    ("Neutral", "中立"),
    ("Ally", "盟友"),
    ("Colonist", "殖民者"),
    ("Prisoner", "囚犯"),
    ("Slave", "奴隶"),
    ("Trader", "商人"),
    ("Visitor", "访客"),
    ("Beggar", "乞讨者"),
    ("AllyInBattle", "援军"),
    ("Guard", "护卫"),
    ("Raider", "袭击者"),
    ("Kidnapper", "绑匪"),
    ("Thief", "小偷"),
    ("PrisonBreaker", "越狱者"),
    ("Rebel", "叛乱者"),
    ("RitualParticipant", "仪式参与者"),
    ("Defender", "防御者"),
    ("PassingBy", "过客"),
];

/// Chinese gloss of a role or relation name.
pub fn gloss(term: &str) -> Option<&'static str> {
    GLOSSES
        .iter()
        .find(|(en, _)| *en == term)
        .map(|&(_, zh)| zh)
}

/// A pawn that should have an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredPawn<'a> {
    /// The pawn's full name (the entry subject).
    pub full_name: &'a str,
    /// Category prefix for the entry.
    pub prefix: &'static str,
    /// The pawn's slimmed document.
    pub pawn: &'a Value,
}

impl DesiredPawn<'_> {
    /// Name of the entry this pawn should have.
    pub fn entry_name(&self) -> String {
        entry_name(self.prefix, self.full_name)
    }

    /// The write request for this pawn's entry.
    pub fn upsert(&self) -> EntryUpsert {
        let content = serde_json::to_string_pretty(self.pawn).unwrap_or_else(|_| self.pawn.to_string());
        EntryUpsert::new(
            self.entry_name(),
            content,
            UpsertOptions::keyword_triggered(pawn_keywords(self.pawn)),
        )
    }
}

/// Collect the desired pawn set from a slimmed snapshot, keyed by full
/// name.
///
/// Pawns without a `FullName` are skipped.
pub fn desired_pawns(snapshot: &Value) -> BTreeMap<&str, DesiredPawn<'_>> {
    let mut desired = BTreeMap::new();
    for pawn in array(snapshot.get("PlayerPawns")) {
        if let Some(full_name) = full_name(pawn) {
            desired.insert(
                full_name,
                DesiredPawn {
                    full_name,
                    prefix: PAWN_PREFIX,
                    pawn,
                },
            );
        }
    }
    let groups = snapshot.get("Map").and_then(|m| m.get("PawnGroups"));
    for group in array(groups) {
        for pawn in array(group.get("Members")) {
            let Some(full_name) = full_name(pawn) else {
                continue;
            };
            let prefix = if is_hostile(pawn) {
                HOSTILE_PREFIX
            } else {
                FRIENDLY_PREFIX
            };
            desired.insert(
                full_name,
                DesiredPawn {
                    full_name,
                    prefix,
                    pawn,
                },
            );
        }
    }
    desired
}

/// Whether a pawn is hostile to the player.
pub fn is_hostile(pawn: &Value) -> bool {
    pawn.get("RelationToPlayer").and_then(Value::as_str) == Some("Hostile")
}

/// Activation keywords for a pawn, deduplicated in first-seen order.
pub fn pawn_keywords(pawn: &Value) -> Vec<String> {
    let mut keywords: Vec<&str> = Vec::new();
    if let Some(name) = full_name(pawn) {
        keywords.push(name);
        if let Some(first) = name.split(' ').next().filter(|first| *first != name) {
            keywords.push(first);
        }
    }
    keywords.extend(array(pawn.get("Traits")).filter_map(|t| str_field(t, "Label")));
    keywords.extend(
        array(pawn.get("Skills"))
            .filter(|s| str_field(s, "Passion") != Some("None"))
            .filter_map(|s| str_field(s, "Name")),
    );
    let backstory = pawn.get("Backstory");
    for stage in ["Childhood", "Adulthood"] {
        if let Some(title) = backstory
            .and_then(|b| b.get(stage))
            .and_then(|s| str_field(s, "Title"))
        {
            keywords.push(title);
        }
    }
    for field in ["IdeologyName", "XenotypeLabel", "FactionName"] {
        if let Some(value) = str_field(pawn, field) {
            keywords.push(value);
        }
    }
    for field in ["MapRole", "RelationToPlayer"] {
        if let Some(value) = str_field(pawn, field) {
            keywords.push(value);
            if let Some(zh) = gloss(value) {
                keywords.push(zh);
            }
        }
    }
    sillyworld_types::dedup_keywords(keywords)
}

fn full_name(pawn: &Value) -> Option<&str> {
    str_field(pawn, "FullName")
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub(crate) fn array(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value.and_then(Value::as_array).into_iter().flatten()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keywords_cover_identity_and_glosses() {
        let pawn = json!({
            "FullName": "Jane Doe",
            "Traits": [{"Label": "Kind"}, {"Label": "Tough"}],
            "Skills": [
                {"Name": "Cooking", "Passion": "Major"},
                {"Name": "Mining", "Passion": "None"}
            ],
            "Backstory": {"Childhood": {"Title": "Urchin"}, "Adulthood": {"Title": "Medic"}},
            "IdeologyName": "Way of the Rim",
            "XenotypeLabel": "Baseliner",
            "FactionName": "New Arrivals",
            "MapRole": "Colonist",
            "RelationToPlayer": "Ally"
        });
        assert_eq!(
            pawn_keywords(&pawn),
            vec![
                "Jane Doe", "Jane", "Kind", "Tough", "Cooking", "Urchin", "Medic",
                "Way of the Rim", "Baseliner", "New Arrivals", "Colonist", "殖民者", "Ally", "盟友"
            ]
        );
    }

    #[test]
    fn single_word_names_are_not_repeated() {
        let pawn = json!({"FullName": "Tynan", "FactionName": "Tynan"});
        assert_eq!(pawn_keywords(&pawn), vec!["Tynan"]);
    }

    #[test]
    fn group_members_override_roster_prefix() {
        let snapshot = json!({
            "PlayerPawns": [{"FullName": "Jane"}, {"FullName": "Bob"}],
            "Map": {"PawnGroups": [
                {"GroupName": "Raider", "Members": [{"FullName": "Bob", "RelationToPlayer": "Hostile"}]},
                {"GroupName": "Trader", "Members": [{"FullName": "Ann", "RelationToPlayer": "Neutral"}, {"Age": 3}]}
            ]}
        });
        let desired = desired_pawns(&snapshot);
        assert_eq!(desired.len(), 3);
        assert_eq!(desired.get("Jane").unwrap().prefix, PAWN_PREFIX);
        assert_eq!(desired.get("Bob").unwrap().prefix, HOSTILE_PREFIX);
        assert_eq!(desired.get("Ann").unwrap().prefix, FRIENDLY_PREFIX);
        assert_eq!(desired.get("Ann").unwrap().entry_name(), "[Friendly] Ann");
    }

    #[test]
    fn upsert_is_keyword_triggered_and_enabled() {
        let pawn = json!({"FullName": "Jane"});
        let desired = DesiredPawn {
            full_name: "Jane",
            prefix: PAWN_PREFIX,
            pawn: &pawn,
        };
        let upsert = desired.upsert();
        assert!(upsert.options.enabled);
        assert_eq!(upsert.options.keywords, vec!["Jane".to_owned()]);
        assert_eq!(upsert.content, "{\n  \"FullName\": \"Jane\"\n}");
    }
}
