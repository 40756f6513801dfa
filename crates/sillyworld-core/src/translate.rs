//! Event translation: turning an [`EventSummary`] into narrative text.
//!
//! Output is a time header for the summary's window followed by one line
//! per event. Known [`EventKind`]s get a dedicated sentence; anything else
//! falls through to a generic line that embeds the event details as a JSON
//! block so nothing the game reported is lost. Events without a type are
//! skipped, as are known events missing the participants their sentence
//! needs.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use sillyworld_types::{EventKind, EventSummary, GameEvent, Locale};

use crate::flush::TICKS_PER_HOUR;

/// Ticks in one in-game day.
pub const TICKS_PER_DAY: u64 = 60_000;

/// Renders summaries in the selected [`Locale`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTranslator;

impl EventTranslator {
    /// Create a translator.
    pub const fn new() -> Self {
        Self
    }

    /// Translate a whole summary.
    ///
    /// A summary with no events renders as the empty string.
    pub fn translate(&self, summary: &EventSummary, locale: Locale) -> String {
        if summary.events.is_empty() {
            return String::new();
        }
        let header = time_header(summary, locale);
        let lines: Vec<String> = summary
            .events
            .iter()
            .filter_map(|event| self.translate_event(event, locale))
            .collect();
        format!("{header}\n\n{}", lines.join("\n"))
    }

    /// Translate one event, or `None` when it should be left out.
    pub fn translate_event(&self, event: &GameEvent, locale: Locale) -> Option<String> {
        let kind = event.kind()?;
        let time = event
            .time_of_day
            .clone()
            .unwrap_or_else(|| format_time(event.tick.unwrap_or(0)));
        match locale {
            Locale::Zh => zh::line(kind, event, &time),
            Locale::En => en::line(kind, event, &time),
        }
    }
}

/// Format a tick as `HH:MM` within its day.
pub fn format_time(tick: u64) -> String {
    let in_day = tick.checked_rem(TICKS_PER_DAY).unwrap_or(0);
    let hour = in_day.checked_div(TICKS_PER_HOUR).unwrap_or(0);
    let minute = in_day
        .checked_rem(TICKS_PER_HOUR)
        .and_then(|rem| rem.checked_mul(60))
        .and_then(|scaled| scaled.checked_div(TICKS_PER_HOUR))
        .unwrap_or(0);
    format!("{hour:02}:{minute:02}")
}

fn time_header(summary: &EventSummary, locale: Locale) -> String {
    let start_time = summary
        .start_time_of_day
        .clone()
        .unwrap_or_else(|| format_time(summary.start_tick));
    let end_time = summary
        .end_time_of_day
        .clone()
        .unwrap_or_else(|| format_time(summary.end_tick));
    let start_date = summary.start_date_string.as_deref();
    let end_date = summary.end_date_string.as_deref();
    match (locale, start_date == end_date, start_date) {
        (Locale::Zh, true, Some(date)) => format!("【{date}，从 {start_time} 到 {end_time}】"),
        (Locale::Zh, true, None) => format!("【从 {start_time} 到 {end_time}】"),
        (Locale::Zh, false, _) => format!(
            "【从 {} {start_time} 到 {} {end_time}】",
            start_date.unwrap_or_default(),
            end_date.unwrap_or_default()
        ),
        (Locale::En, true, Some(date)) => format!("[{date}, from {start_time} to {end_time}]"),
        (Locale::En, true, None) => format!("[From {start_time} to {end_time}]"),
        (Locale::En, false, _) => format!(
            "[From {} {start_time} to {} {end_time}]",
            start_date.unwrap_or_default(),
            end_date.unwrap_or_default()
        ),
    }
}

static COLOUR_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</?color(=[^>]*)?>").ok());

/// Remove `<color=...>` and `</color>` markup.
pub fn strip_colour_tags(text: &str) -> String {
    COLOUR_TAG
        .as_ref()
        .map_or_else(|| text.to_owned(), |re| re.replace_all(text, "").into_owned())
}

/// One traded item from a `TradeCompleted` event.
struct TradedItem<'a> {
    name: &'a str,
    count: i64,
    sold: bool,
}

fn traded_items(event: &GameEvent) -> Vec<TradedItem<'_>> {
    event
        .detail("TradedItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let sold = match item.get("TradeAction").and_then(Value::as_str)? {
                        "PlayerSells" => true,
                        "PlayerBuys" => false,
                        _ => return None,
                    };
                    Some(TradedItem {
                        name: item.get("ItemName").and_then(Value::as_str).unwrap_or("?"),
                        count: item.get("Count").and_then(Value::as_i64).unwrap_or(0),
                        sold,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn item_list(items: &[TradedItem<'_>], sold: bool, separator: &str) -> Option<String> {
    let parts: Vec<String> = items
        .iter()
        .filter(|i| i.sold == sold)
        .map(|i| format!("{} x{}", i.name, i.count.unsigned_abs()))
        .collect();
    (!parts.is_empty()).then(|| parts.join(separator))
}

fn details_are_empty(event: &GameEvent) -> bool {
    match &event.details {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn pretty_details(event: &GameEvent) -> String {
    serde_json::to_string_pretty(&event.details).unwrap_or_else(|_| event.details.to_string())
}

fn is_drafted(event: &GameEvent) -> bool {
    event
        .detail("IsDrafted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn health_gained(event: &GameEvent) -> bool {
    event.detail_str("ChangeType") == Some("Gained")
}

fn type_name(event: &GameEvent) -> &str {
    event.event_type.as_deref().unwrap_or_default()
}

mod zh {
    use super::{
        EventKind, GameEvent, details_are_empty, health_gained, is_drafted, item_list,
        pretty_details, strip_colour_tags, traded_items, type_name,
    };

    pub(super) fn line(kind: EventKind, event: &GameEvent, time: &str) -> Option<String> {
        match kind {
            EventKind::JobCompleted => {
                let job = event
                    .detail_str("JobName")
                    .map(|j| j.trim_end_matches('。'))
                    .filter(|j| !j.is_empty())
                    .unwrap_or("一项工作");
                Some(event.participant("executor").map_or_else(
                    || format!("{time}, {job} 已被完成。"),
                    |actor| format!("{time}, {actor} 完成了 {job}。"),
                ))
            }
            EventKind::SocialInteraction => {
                if let Some(log) = event.detail_str("InteractionLog").map(strip_colour_tags) {
                    if !log.is_empty() {
                        return Some(format!("{time}, {log}"));
                    }
                }
                let initiator = event.participant("initiator")?;
                let recipient = event.participant("recipient")?;
                Some(format!("{time}, {initiator} 和 {recipient} 进行了一次社交互动。"))
            }
            EventKind::NotificationReceived => {
                let content = event
                    .detail_str("Content")
                    .or_else(|| event.detail_str("Label"))?;
                Some(format!("{time}, {content}"))
            }
            EventKind::PawnDied => {
                let victim = event.participant("victim")?;
                let weapon = event.detail_str("Weapon").unwrap_or("未知原因");
                Some(event.participant("killer").map_or_else(
                    || format!("{time}, {victim} 因 {weapon} 而死。"),
                    |killer| format!("{time}, {killer} 使用 {weapon} 杀死了 {victim}。"),
                ))
            }
            EventKind::PawnBorn => {
                let mother = event.participant("mother");
                let child = event.participant("child");
                Some(match (mother, child) {
                    (Some(mother), Some(child)) => {
                        let father = event
                            .participant("father")
                            .map(|f| format!("和 {f} "))
                            .unwrap_or_default();
                        format!("{time}, {mother} {father}的孩子, {child}, 出生了。")
                    }
                    _ => format!("{time}, 一个新生命诞生了。"),
                })
            }
            EventKind::PawnRelationThresholdChanged => {
                let subject = event.participant("subject")?;
                let object = event.participant("object")?;
                let status = event.detail_str("NewStatus").unwrap_or("未知");
                Some(format!(
                    "{time}, {subject} 和 {object} 的关系发生了变化，现在他们是 {status}。"
                ))
            }
            EventKind::PawnHealthChanged => {
                let subject = event.participant("subject")?;
                let hediff = event.detail_str("Hediff").unwrap_or("未知状况");
                let change = if health_gained(event) {
                    "患上了"
                } else {
                    "从...中康复了"
                };
                Some(format!("{time}, {subject} {change} {hediff}。"))
            }
            EventKind::TradeCompleted => {
                let items = traded_items(event);
                let mut parts = Vec::new();
                if let Some(sold) = item_list(&items, true, "、") {
                    parts.push(format!("卖出了 {sold}"));
                }
                if let Some(bought) = item_list(&items, false, "、") {
                    parts.push(format!("买入了 {bought}"));
                }
                let tail = if parts.is_empty() {
                    String::new()
                } else {
                    format!(" {}。", parts.join("，"))
                };
                let trader = event.detail_str("TraderName").unwrap_or("未知商队");
                Some(event.participant("Negotiator").map_or_else(
                    || format!("{time}, 与 {trader} 完成了一笔交易。{tail}"),
                    |negotiator| format!("{time}, {negotiator} 与 {trader} 完成了一笔交易。{tail}"),
                ))
            }
            EventKind::PawnDraftStatusChanged => {
                let subject = event.participant("subject")?;
                let status = if is_drafted(event) {
                    "已被征召"
                } else {
                    "解除了征召状态"
                };
                Some(format!("{time}, {subject} {status}。"))
            }
            EventKind::SexActFinished => {
                let initiator = event.participant("Initiator")?;
                let partner = event.participant("Partner")?;
                let act = event.detail_str("InteractionType").unwrap_or("未知类型");
                Some(format!("{time}, {initiator} 和 {partner} 完成了一次 {act} 类型的性行为。"))
            }
            EventKind::PawnImpregnated => {
                let mother = event.participant("Subject")?;
                let father = event.participant("Object").unwrap_or("未知来源");
                Some(format!("{time}, {mother} 被 {father} 弄怀孕了。"))
            }
            EventKind::Unrecognized => {
                let name = type_name(event);
                if details_are_empty(event) {
                    Some(format!("{time}, 发生了 {name} 事件。"))
                } else {
                    Some(format!(
                        "{time}, 发生了 **{name}** 事件:\n```json\n{}\n```",
                        pretty_details(event)
                    ))
                }
            }
        }
    }
}

mod en {
    use super::{
        EventKind, GameEvent, details_are_empty, health_gained, is_drafted, item_list,
        pretty_details, strip_colour_tags, traded_items, type_name,
    };

    pub(super) fn line(kind: EventKind, event: &GameEvent, time: &str) -> Option<String> {
        match kind {
            EventKind::JobCompleted => {
                let job = event
                    .detail_str("JobName")
                    .map(|j| j.trim_end_matches(['。', '.']))
                    .filter(|j| !j.is_empty())
                    .unwrap_or("a task");
                Some(event.participant("executor").map_or_else(
                    || format!("{time}, {job} was completed."),
                    |actor| format!("{time}, {actor} completed {job}."),
                ))
            }
            EventKind::SocialInteraction => {
                if let Some(log) = event.detail_str("InteractionLog").map(strip_colour_tags) {
                    if !log.is_empty() {
                        return Some(format!("{time}, {log}"));
                    }
                }
                let initiator = event.participant("initiator")?;
                let recipient = event.participant("recipient")?;
                Some(format!("{time}, {initiator} and {recipient} had a social interaction."))
            }
            EventKind::NotificationReceived => {
                let content = event
                    .detail_str("Content")
                    .or_else(|| event.detail_str("Label"))?;
                Some(format!("{time}, {content}"))
            }
            EventKind::PawnDied => {
                let victim = event.participant("victim")?;
                let weapon = event.detail_str("Weapon").unwrap_or("unknown causes");
                Some(event.participant("killer").map_or_else(
                    || format!("{time}, {victim} died of {weapon}."),
                    |killer| format!("{time}, {killer} killed {victim} with {weapon}."),
                ))
            }
            EventKind::PawnBorn => {
                let mother = event.participant("mother");
                let child = event.participant("child");
                Some(match (mother, child) {
                    (Some(mother), Some(child)) => {
                        let father = event
                            .participant("father")
                            .map(|f| format!(" and {f}"))
                            .unwrap_or_default();
                        format!("{time}, {child}, the child of {mother}{father}, was born.")
                    }
                    _ => format!("{time}, a new life was born."),
                })
            }
            EventKind::PawnRelationThresholdChanged => {
                let subject = event.participant("subject")?;
                let object = event.participant("object")?;
                let status = event.detail_str("NewStatus").unwrap_or("unknown");
                Some(format!(
                    "{time}, the relationship between {subject} and {object} changed; they are now {status}."
                ))
            }
            EventKind::PawnHealthChanged => {
                let subject = event.participant("subject")?;
                let hediff = event.detail_str("Hediff").unwrap_or("an unknown condition");
                Some(if health_gained(event) {
                    format!("{time}, {subject} contracted {hediff}.")
                } else {
                    format!("{time}, {subject} recovered from {hediff}.")
                })
            }
            EventKind::TradeCompleted => {
                let items = traded_items(event);
                let mut parts = Vec::new();
                if let Some(sold) = item_list(&items, true, ", ") {
                    parts.push(format!("Sold {sold}"));
                }
                if let Some(bought) = item_list(&items, false, ", ") {
                    parts.push(format!("bought {bought}"));
                }
                let tail = if parts.is_empty() {
                    String::new()
                } else {
                    format!(" {}.", parts.join("; "))
                };
                let trader = event.detail_str("TraderName").unwrap_or("an unknown trader");
                Some(event.participant("Negotiator").map_or_else(
                    || format!("{time}, a trade with {trader} was completed.{tail}"),
                    |negotiator| {
                        format!("{time}, {negotiator} completed a trade with {trader}.{tail}")
                    },
                ))
            }
            EventKind::PawnDraftStatusChanged => {
                let subject = event.participant("subject")?;
                let status = if is_drafted(event) {
                    "was drafted"
                } else {
                    "was undrafted"
                };
                Some(format!("{time}, {subject} {status}."))
            }
            EventKind::SexActFinished => {
                let initiator = event.participant("Initiator")?;
                let partner = event.participant("Partner")?;
                let act = event.detail_str("InteractionType").unwrap_or("unknown");
                Some(format!("{time}, {initiator} and {partner} had an intimate encounter ({act})."))
            }
            EventKind::PawnImpregnated => {
                let mother = event.participant("Subject")?;
                let father = event.participant("Object").unwrap_or("an unknown father");
                Some(format!("{time}, {mother} became pregnant by {father}."))
            }
            EventKind::Unrecognized => {
                let name = type_name(event);
                if details_are_empty(event) {
                    Some(format!("{time}, a {name} event occurred."))
                } else {
                    Some(format!(
                        "{time}, a **{name}** event occurred:\n```json\n{}\n```",
                        pretty_details(event)
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use sillyworld_types::Participant;

    use super::*;

    fn event(kind: &str, participants: &[(&str, &str)], details: Value) -> GameEvent {
        GameEvent {
            event_type: Some(kind.to_owned()),
            tick: Some(2500),
            time_of_day: Some("01:00".to_owned()),
            participants: participants
                .iter()
                .map(|(role, name)| Participant {
                    role: (*role).to_owned(),
                    pawn_name: Some((*name).to_owned()),
                })
                .collect(),
            details,
        }
    }

    fn dated(mut summary: EventSummary, start: &str, end: &str) -> EventSummary {
        summary.start_date_string = Some(start.to_owned());
        summary.end_date_string = Some(end.to_owned());
        summary.start_time_of_day = Some("06:00".to_owned());
        summary.end_time_of_day = Some("10:00".to_owned());
        summary
    }

    #[test]
    fn format_time_derives_hour_and_minute() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(2500), "01:00");
        assert_eq!(format_time(60_000 + 3750), "01:30");
    }

    #[test]
    fn empty_summary_renders_nothing() {
        let t = EventTranslator::new();
        assert_eq!(t.translate(&EventSummary::new(0, 100, Vec::new()), Locale::Zh), "");
    }

    #[test]
    fn single_day_header() {
        let t = EventTranslator::new();
        let summary = dated(
            EventSummary::new(0, 100, vec![event("PawnDied", &[("victim", "Jane")], json!({}))]),
            "5th of Aprimay",
            "5th of Aprimay",
        );
        let text = t.translate(&summary, Locale::Zh);
        assert_eq!(
            text,
            "【5th of Aprimay，从 06:00 到 10:00】\n\n01:00, Jane 因 未知原因 而死。"
        );
    }

    #[test]
    fn multi_day_header() {
        let t = EventTranslator::new();
        let summary = dated(
            EventSummary::new(0, 100, vec![event("PawnBorn", &[], json!({}))]),
            "5th",
            "6th",
        );
        let text = t.translate(&summary, Locale::En);
        assert!(text.starts_with("[From 5th 06:00 to 6th 10:00]\n\n"));
        assert!(text.ends_with("01:00, a new life was born."));
    }

    #[test]
    fn social_log_loses_colour_markup() {
        let t = EventTranslator::new();
        let e = event(
            "SocialInteraction",
            &[],
            json!({"InteractionLog": "<color=#FF0000>Jane</color> chatted with Bob"}),
        );
        assert_eq!(
            t.translate_event(&e, Locale::En).as_deref(),
            Some("01:00, Jane chatted with Bob")
        );
    }

    #[test]
    fn stray_angle_brackets_survive() {
        assert_eq!(strip_colour_tags("a < b <color=#0f0>c</color>"), "a < b c");
    }

    #[test]
    fn every_colour_tag_form_is_removed() {
        assert_eq!(
            strip_colour_tags("<color=red>Jane</color> and <color=#00FF00AA>Bob</color><color>!</color>"),
            "Jane and Bob!"
        );
        assert_eq!(strip_colour_tags("<colour>x</b>"), "<colour>x</b>");
    }

    #[test]
    fn intimate_encounter_needs_both_pawns() {
        let t = EventTranslator::new();
        let e = event(
            "SexActFinished",
            &[("Initiator", "Jane"), ("Partner", "Bob")],
            json!({"InteractionType": "Vaginal"}),
        );
        assert_eq!(
            t.translate_event(&e, Locale::Zh).as_deref(),
            Some("01:00, Jane 和 Bob 完成了一次 Vaginal 类型的性行为。")
        );
        let alone = event("SexActFinished", &[("Initiator", "Jane")], json!({}));
        assert_eq!(t.translate_event(&alone, Locale::En), None);
    }

    #[test]
    fn pregnancy_falls_back_to_unknown_father() {
        let t = EventTranslator::new();
        let known = event("PawnImpregnated", &[("Subject", "Jane"), ("Object", "Bob")], json!({}));
        assert_eq!(
            t.translate_event(&known, Locale::En).as_deref(),
            Some("01:00, Jane became pregnant by Bob.")
        );
        let unknown = event("PawnImpregnated", &[("Subject", "Jane")], json!({}));
        assert_eq!(
            t.translate_event(&unknown, Locale::Zh).as_deref(),
            Some("01:00, Jane 被 未知来源 弄怀孕了。")
        );
        assert_eq!(t.translate_event(&event("PawnImpregnated", &[], json!({})), Locale::Zh), None);
    }

    #[test]
    fn trade_lists_sold_and_bought() {
        let t = EventTranslator::new();
        let e = event(
            "TradeCompleted",
            &[("Negotiator", "Jane")],
            json!({
                "TraderName": "Bulk goods trader",
                "TradedItems": [
                    {"ItemName": "Steel", "Count": -20, "TradeAction": "PlayerSells"},
                    {"ItemName": "Medicine", "Count": 3, "TradeAction": "PlayerBuys"}
                ]
            }),
        );
        assert_eq!(
            t.translate_event(&e, Locale::Zh).as_deref(),
            Some("01:00, Jane 与 Bulk goods trader 完成了一笔交易。 卖出了 Steel x20，买入了 Medicine x3。")
        );
    }

    #[test]
    fn untyped_events_are_skipped() {
        let t = EventTranslator::new();
        let mut e = event("JobCompleted", &[], json!({}));
        e.event_type = None;
        assert!(t.translate_event(&e, Locale::Zh).is_none());
    }

    #[test]
    fn unrecognized_events_embed_details() {
        let t = EventTranslator::new();
        let e = event("RaidStarted", &[], json!({"Faction": "Pirates"}));
        let text = t.translate_event(&e, Locale::En).unwrap();
        assert!(text.starts_with("01:00, a **RaidStarted** event occurred:\n```json\n"));
        assert!(text.contains("\"Faction\": \"Pirates\""));
        let bare = event("RaidStarted", &[], json!({}));
        assert_eq!(
            t.translate_event(&bare, Locale::Zh).as_deref(),
            Some("01:00, 发生了 RaidStarted 事件。")
        );
    }

    #[test]
    fn missing_time_of_day_falls_back_to_tick() {
        let t = EventTranslator::new();
        let mut e = event("PawnDraftStatusChanged", &[("subject", "Jane")], json!({"IsDrafted": true}));
        e.time_of_day = None;
        e.tick = Some(5000);
        assert_eq!(
            t.translate_event(&e, Locale::En).as_deref(),
            Some("02:00, Jane was drafted.")
        );
    }
}
