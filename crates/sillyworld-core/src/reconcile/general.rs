//! General entries: world overview, rosters, factions, ideologies and the
//! other non-pawn categories.
//!
//! Each category maps deterministically onto one or more entry names and
//! is rewritten in full on every pass. Most are always active; factions,
//! ideologies and xenotypes are keyword-triggered.

use serde_json::{Map, Value, json};
use sillyworld_types::{ActivationStrategy, EntryUpsert, UpsertOptions, entry_name};

use super::pawn::array;
use crate::transform::TransformedSnapshot;

/// Prefixes owned by the general categories.
pub const GENERAL_PREFIXES: [&str; 6] = [
    WORLD_PREFIX,
    COLONY_PREFIX,
    FACTION_PREFIX,
    IDEO_PREFIX,
    XENOTYPE_PREFIX,
    QUEST_PREFIX,
];

const WORLD_PREFIX: &str = "[World]";
const COLONY_PREFIX: &str = "[Colony]";
const FACTION_PREFIX: &str = "[Faction]";
const IDEO_PREFIX: &str = "[Ideo]";
const XENOTYPE_PREFIX: &str = "[Xenotype]";
const QUEST_PREFIX: &str = "[Quest]";

/// Map groups that get their own roster entry, even when absent.
pub const ROSTER_GROUPS: [&str; 6] = ["Trader", "Visitor", "Raider", "AllyInBattle", "Beggar", "Guard"];

const MAP_KEYWORDS: [&str; 8] = ["map", "location", "area", "surroundings", "地图", "位置", "区域", "环境"];

const QUIET_MAP: &str = "The map is currently quiet. No major events are happening.";
const NO_ALERTS: &str = "No active alerts.";
const NO_ANOMALY: &str = "No anomaly data available.";
const NO_GRAVSHIP: &str = "No gravship data available.";
const NO_QUESTS: &str = "No active quests.";

/// Every general entry the snapshot calls for, in a stable order.
pub fn desired_general(snapshot: &TransformedSnapshot) -> Vec<EntryUpsert> {
    let state = &snapshot.slimmed;
    let mut out = vec![constant(world("Overview"), pretty(&overview(state)))];
    if let Some(map) = state.get("DescriptiveMap") {
        out.push(map_description(map));
    }
    out.push(constant(world("Current Map Events"), map_events(state)));
    out.push(constant(world("Colonist Roster"), pretty(&colonist_roster(state))));
    out.extend(group_rosters(state));
    if let Some(research) = state.get("Research") {
        out.push(constant(world("Research"), pretty(research)));
    }
    out.push(constant(
        entry_name(COLONY_PREFIX, "Active Alerts"),
        non_empty(state.get("Alerts")).map_or_else(|| NO_ALERTS.to_owned(), pretty),
    ));
    out.push(constant(
        world("Anomaly"),
        non_empty(state.get("Anomaly")).map_or_else(|| NO_ANOMALY.to_owned(), pretty),
    ));
    out.push(constant(
        world("Gravship"),
        non_empty(state.get("Gravship")).map_or_else(|| NO_GRAVSHIP.to_owned(), pretty),
    ));
    out.extend(factions(state));
    out.extend(ideologies(state));
    out.extend(xenotypes(state));
    out.extend(quests(state));
    if let Some(tales) = state.get("Tales") {
        out.push(constant(world("Historical Tales"), pretty(tales)));
    }
    if let Some(lore) = snapshot.universal_lore.as_deref().filter(|l| !l.trim().is_empty()) {
        out.push(constant(world("Universal Lorebook"), lore.to_owned()));
    }
    out
}

fn world(subject: &str) -> String {
    entry_name(WORLD_PREFIX, subject)
}

fn constant(name: String, content: String) -> EntryUpsert {
    EntryUpsert::new(name, content, UpsertOptions::always_active())
}

fn selective<'a>(name: String, content: String, keywords: impl IntoIterator<Item = &'a str>) -> EntryUpsert {
    EntryUpsert::new(name, content, UpsertOptions::keyword_triggered(keywords))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    })
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Copy `keys` of `source` into a new object, skipping absent ones.
fn pick(source: Option<&Value>, keys: &[(&str, &str)]) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(source) = source {
        for &(from, to) in keys {
            if let Some(value) = source.get(from).filter(|v| !v.is_null()) {
                out.insert(to.to_owned(), value.clone());
            }
        }
    }
    out
}

fn overview(state: &Value) -> Value {
    let mut out = pick(
        Some(state),
        &[
            ("TimeOfDay", "TimeOfDay"),
            ("Storyteller", "Storyteller"),
            ("Scenario", "Scenario"),
            ("Resources", "ColonyResources"),
        ],
    );
    let map_info = pick(
        state.get("Map"),
        &[("Biome", "Biome"), ("Weather", "Weather"), ("Temperature", "Temperature")],
    );
    if !map_info.is_empty() {
        out.insert("MapInfo".to_owned(), Value::Object(map_info));
    }
    let world_info = pick(state.get("World"), &[("PlanetName", "PlanetName")]);
    if !world_info.is_empty() {
        out.insert("WorldInfo".to_owned(), Value::Object(world_info));
    }
    Value::Object(out)
}

fn map_description(map: &Value) -> EntryUpsert {
    let mut keywords: Vec<&str> = MAP_KEYWORDS.to_vec();
    for list in ["NaturalFeatures", "ManMadeAreas"] {
        keywords.extend(array(map.get(list)).filter_map(|f| str_field(f, "Label")));
    }
    let options = UpsertOptions {
        strategy: ActivationStrategy::AlwaysActive,
        ..UpsertOptions::keyword_triggered(keywords)
    };
    EntryUpsert::new(world("Map Description"), pretty(map), options)
}

fn pawn_groups(state: &Value) -> impl Iterator<Item = &Value> {
    array(state.get("Map").and_then(|m| m.get("PawnGroups")))
}

fn map_events(state: &Value) -> String {
    let lines: Vec<String> = pawn_groups(state).map(group_line).collect();
    if lines.is_empty() {
        QUIET_MAP.to_owned()
    } else {
        lines.join("\n")
    }
}

fn group_line(group: &Value) -> String {
    let count = array(group.get("Members")).count();
    let faction = str_field(group, "FactionName").unwrap_or("an unknown faction");
    let leader = str_field(group, "LeaderName")
        .map(|l| format!(" Their leader is {l}."))
        .unwrap_or_default();
    match str_field(group, "GroupName").unwrap_or_default() {
        "Trader" => format!("A trade caravan from {faction} with {count} members is visiting.{leader}"),
        "Visitor" => format!("A group of {count} visitors from {faction} are on the map.{leader}"),
        "Raider" => format!("A group of {count} raiders from {faction} are attacking.{leader}"),
        "AllyInBattle" => format!("{count} reinforcements from {faction} have arrived to help.{leader}"),
        "Beggar" => format!("A group of {count} beggars from {faction} are asking for help.{leader}"),
        other => format!(
            "A group of {count} individuals from {faction} of type '{other}' are present.{leader}"
        ),
    }
}

fn colonist_roster(state: &Value) -> Value {
    let names: Vec<&str> = array(state.get("PlayerPawns"))
        .filter_map(|p| str_field(p, "FullName"))
        .collect();
    json!({ "ColonistCount": names.len(), "Colonists": names })
}

fn group_rosters(state: &Value) -> Vec<EntryUpsert> {
    ROSTER_GROUPS
        .iter()
        .map(|&group| {
            let members: Vec<&str> = pawn_groups(state)
                .filter(|g| str_field(g, "GroupName") == Some(group))
                .flat_map(|g| array(g.get("Members")))
                .filter_map(|p| str_field(p, "FullName"))
                .collect();
            let roster = json!({ "Count": members.len(), "Members": members });
            constant(world(&format!("{group} Roster")), pretty(&roster))
        })
        .collect()
}

fn factions(state: &Value) -> Vec<EntryUpsert> {
    array(state.get("Factions"))
        .filter_map(|faction| {
            let name = str_field(faction, "Name")?;
            let mut keywords = vec![name];
            keywords.extend(str_field(faction, "LeaderName"));
            keywords.extend(array(faction.get("Settlements")).filter_map(|s| str_field(s, "Name")));
            Some(selective(entry_name(FACTION_PREFIX, name), pretty(faction), keywords))
        })
        .collect()
}

fn ideologies(state: &Value) -> Vec<EntryUpsert> {
    array(state.get("Ideologies"))
        .filter_map(|ideo| {
            let name = str_field(ideo, "Name")?;
            let mut keywords = vec![name];
            keywords.extend(str_field(ideo, "Culture"));
            keywords.extend(array(ideo.get("Memes")).filter_map(Value::as_str));
            Some(selective(entry_name(IDEO_PREFIX, name), pretty(ideo), keywords))
        })
        .collect()
}

fn xenotypes(state: &Value) -> Vec<EntryUpsert> {
    let all: Vec<&Value> = match state.get("Xenotypes") {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(items)) => items.iter().collect(),
        _ => Vec::new(),
    };
    all.into_iter()
        .filter_map(|xeno| {
            let label = str_field(xeno, "Label")?;
            Some(selective(entry_name(XENOTYPE_PREFIX, label), pretty(xeno), [label]))
        })
        .collect()
}

fn quests(state: &Value) -> Vec<EntryUpsert> {
    let quests: Vec<EntryUpsert> = array(state.get("Quests"))
        .filter_map(|quest| {
            let name = str_field(quest, "Name")?;
            Some(constant(entry_name(QUEST_PREFIX, name), pretty(quest)))
        })
        .collect();
    if quests.is_empty() {
        vec![constant(world("Active Quests"), NO_QUESTS.to_owned())]
    } else {
        quests
    }
}
