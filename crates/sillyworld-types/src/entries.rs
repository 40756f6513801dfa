//! Derived knowledge entries projected into the external entry store.
//!
//! An entry name encodes a category prefix and a subject, e.g.
//! `[Pawn] Jane Doe`. The store lists entries as [`DerivedEntry`] values
//! and accepts writes as [`EntryUpsert`] values carrying typed
//! [`UpsertOptions`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// How an entry is activated during prompt assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActivationStrategy {
    /// Injected only when one of the entry's keywords appears in context.
    #[default]
    #[serde(rename = "selective")]
    KeywordTriggered,
    /// Always injected.
    #[serde(rename = "constant")]
    AlwaysActive,
}

/// Where the store inserts an entry's content relative to the character
/// definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPlacement {
    /// Before the character definition.
    #[default]
    BeforeCharacterDefinition,
    /// After the character definition.
    AfterCharacterDefinition,
}

/// Placement plus ordering of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntryPosition {
    /// Insertion point.
    #[serde(rename = "type")]
    pub placement: EntryPlacement,
    /// Relative order among entries at the same insertion point.
    pub order: i32,
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// A parsed entry name: `[Category] Subject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryName<'a> {
    /// Category prefix including brackets, e.g. `[Pawn]`.
    pub prefix: &'a str,
    /// Subject identifier following the prefix.
    pub subject: &'a str,
}

impl<'a> EntryName<'a> {
    /// Split a name into prefix and subject.
    ///
    /// Returns `None` when the name does not start with a bracketed prefix
    /// followed by a space and a non-empty subject.
    pub fn parse(name: &'a str) -> Option<Self> {
        if !name.starts_with('[') {
            return None;
        }
        let close = name.find(']')?;
        let (prefix, rest) = name.split_at(close.checked_add(1)?);
        let subject = rest.strip_prefix(' ')?;
        if subject.is_empty() {
            return None;
        }
        Some(Self { prefix, subject })
    }
}

/// Compose an entry name from a prefix and a subject.
pub fn entry_name(prefix: &str, subject: &str) -> String {
    format!("{prefix} {subject}")
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// An entry as it exists in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedEntry {
    /// Unique name within the store.
    pub name: String,
    /// Serialized content payload.
    pub content: String,
    /// Activation keywords (meaningful for keyword-triggered entries).
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Activation strategy.
    #[serde(default)]
    pub strategy: ActivationStrategy,
    /// Whether the entry takes part in prompt assembly.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl DerivedEntry {
    /// Parsed name of this entry, if it follows the prefix convention.
    pub fn parsed_name(&self) -> Option<EntryName<'_>> {
        EntryName::parse(&self.name)
    }
}

/// Options accompanying an entry write.
///
/// Defaults: no keywords, enabled, keyword-triggered, placed before the
/// character definition at order 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOptions {
    /// Activation keywords, deduplicated in first-seen order.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Whether the entry is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Activation strategy.
    #[serde(default)]
    pub strategy: ActivationStrategy,
    /// Placement in the prompt.
    #[serde(default)]
    pub position: EntryPosition,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            enabled: true,
            strategy: ActivationStrategy::KeywordTriggered,
            position: EntryPosition::default(),
        }
    }
}

impl UpsertOptions {
    /// Keyword-triggered options with the given keywords.
    pub fn keyword_triggered<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: dedup_keywords(keywords),
            ..Self::default()
        }
    }

    /// Always-active options.
    pub fn always_active() -> Self {
        Self {
            strategy: ActivationStrategy::AlwaysActive,
            ..Self::default()
        }
    }
}

/// A write request for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpsert {
    /// Entry name.
    pub name: String,
    /// Full replacement content.
    pub content: String,
    /// Write options.
    #[serde(flatten)]
    pub options: UpsertOptions,
}

impl EntryUpsert {
    /// Build a write request.
    pub fn new(name: impl Into<String>, content: impl Into<String>, options: UpsertOptions) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            options,
        }
    }

    /// Whether writing this request would leave `existing` unchanged.
    ///
    /// Compares content, enabled flag and strategy; keywords only count
    /// for keyword-triggered entries and are compared as a set.
    pub fn matches(&self, existing: &DerivedEntry) -> bool {
        if existing.content != self.content
            || existing.enabled != self.options.enabled
            || existing.strategy != self.options.strategy
        {
            return false;
        }
        match self.options.strategy {
            ActivationStrategy::AlwaysActive => true,
            ActivationStrategy::KeywordTriggered => {
                let ours: BTreeSet<&str> = self.options.keywords.iter().map(String::as_str).collect();
                let theirs: BTreeSet<&str> = existing.keywords.iter().map(String::as_str).collect();
                ours == theirs
            }
        }
    }

    /// The entry the store holds after applying this write.
    pub fn to_entry(&self) -> DerivedEntry {
        DerivedEntry {
            name: self.name.clone(),
            content: self.content.clone(),
            keywords: self.options.keywords.clone(),
            strategy: self.options.strategy,
            enabled: self.options.enabled,
        }
    }
}

/// Deduplicate keywords, keeping first-seen order and dropping blanks.
pub fn dedup_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for keyword in keywords {
        let keyword: String = keyword.into();
        if keyword.trim().is_empty() {
            continue;
        }
        if seen.insert(keyword.clone()) {
            out.push(keyword);
        }
    }
    out
}

const fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_and_subject() {
        let name = EntryName::parse("[Pawn] Jane Doe");
        assert_eq!(
            name,
            Some(EntryName {
                prefix: "[Pawn]",
                subject: "Jane Doe"
            })
        );
        assert_eq!(EntryName::parse("Pawn Jane"), None);
        assert_eq!(EntryName::parse("[Pawn]"), None);
        assert_eq!(EntryName::parse("[Pawn] "), None);
    }

    #[test]
    fn subject_with_brackets_keeps_first_prefix() {
        let name = EntryName::parse("[Hostile] Raider [Boss]");
        assert_eq!(name.map(|n| n.subject), Some("Raider [Boss]"));
    }

    #[test]
    fn keyword_order_does_not_affect_equality() {
        let write = EntryUpsert::new(
            "[Pawn] Jane",
            "{}",
            UpsertOptions::keyword_triggered(["Jane", "Cook"]),
        );
        let existing = DerivedEntry {
            name: "[Pawn] Jane".to_owned(),
            content: "{}".to_owned(),
            keywords: vec!["Cook".to_owned(), "Jane".to_owned()],
            strategy: ActivationStrategy::KeywordTriggered,
            enabled: true,
        };
        assert!(write.matches(&existing));
    }

    #[test]
    fn disabled_flag_breaks_equality() {
        let write = EntryUpsert::new("[World] Overview", "x", UpsertOptions::always_active());
        let mut existing = write.to_entry();
        assert!(write.matches(&existing));
        existing.enabled = false;
        assert!(!write.matches(&existing));
    }

    #[test]
    fn always_active_ignores_keywords() {
        let write = EntryUpsert::new("[World] Overview", "x", UpsertOptions::always_active());
        let mut existing = write.to_entry();
        existing.keywords = vec!["stale".to_owned()];
        assert!(write.matches(&existing));
    }

    #[test]
    fn dedup_drops_blanks_and_repeats() {
        let keys = dedup_keywords(["Jane", "", "Jane", " ", "Cook"]);
        assert_eq!(keys, vec!["Jane".to_owned(), "Cook".to_owned()]);
    }

    #[test]
    fn strategy_uses_store_wire_names() {
        let json = serde_json::to_string(&ActivationStrategy::AlwaysActive).ok();
        assert_eq!(json.as_deref(), Some("\"constant\""));
    }
}
