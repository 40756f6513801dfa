//! Story-mode lore rendering via `minijinja`.
//!
//! The lore document (`Scenario`, `Factions`, `PlayerPawns`) is rendered to
//! markdown through one template per locale. Templates are compiled into
//! the binary and can be replaced from a directory so operators can tune
//! the layout without recompiling.

use std::path::Path;

use minijinja::Environment;
use serde_json::Value;
use sillyworld_types::Locale;
use tracing::debug;

const LORE_ZH: &str = include_str!("../templates/lore_zh.md.j2");
const LORE_EN: &str = include_str!("../templates/lore_en.md.j2");

/// Errors raised while loading or rendering lore templates.
#[derive(Debug, thiserror::Error)]
pub enum LoreError {
    /// A template override could not be read.
    #[error("failed to read template {path}: {source}")]
    Io {
        /// Path of the override file.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A template failed to compile or render.
    #[error("lore template {name} failed: {source}")]
    Template {
        /// Template name.
        name: String,
        /// The underlying template error.
        source: minijinja::Error,
    },
}

/// Renders lore documents to markdown.
pub struct LoreFormatter {
    env: Environment<'static>,
}

impl std::fmt::Debug for LoreFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoreFormatter").finish_non_exhaustive()
    }
}

impl LoreFormatter {
    /// A formatter using the built-in templates.
    pub fn embedded() -> Result<Self, LoreError> {
        Self::build(|_| Ok(None))
    }

    /// A formatter preferring `lore_{locale}.md.j2` files in `dir` over the
    /// built-in templates. Missing files fall back silently.
    pub fn with_overrides(dir: &Path) -> Result<Self, LoreError> {
        Self::build(|file| {
            let path = dir.join(file);
            if !path.exists() {
                return Ok(None);
            }
            debug!(path = %path.display(), "loading lore template override");
            std::fs::read_to_string(&path).map(Some).map_err(|source| LoreError::Io {
                path: path.display().to_string(),
                source,
            })
        })
    }

    fn build(load: impl Fn(&str) -> Result<Option<String>, LoreError>) -> Result<Self, LoreError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (locale, embedded) in [(Locale::Zh, LORE_ZH), (Locale::En, LORE_EN)] {
            let name = template_name(locale);
            let source = load(&name)?.unwrap_or_else(|| embedded.to_owned());
            env.add_template_owned(name.clone(), source)
                .map_err(|source| LoreError::Template { name, source })?;
        }
        Ok(Self { env })
    }

    /// Render a lore document.
    ///
    /// A null document renders as a short "no data" notice.
    pub fn render(&self, lore: &Value, locale: Locale) -> Result<String, LoreError> {
        if lore.is_null() {
            return Ok(no_data(locale).to_owned());
        }
        let name = template_name(locale);
        self.env
            .get_template(&name)
            .and_then(|template| template.render(lore))
            .map_err(|source| LoreError::Template { name, source })
    }
}

fn template_name(locale: Locale) -> String {
    format!("lore_{}.md.j2", locale.code())
}

const fn no_data(locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => "没有可用的故事数据。",
        Locale::En => "No story data available.",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lore() -> Value {
        json!({
            "Scenario": {"Name": "Crashlanded", "Summary": "Three survivors.\nNo ship."},
            "Factions": [
                {"Name": "Pirates", "RelationToPlayer": "Hostile", "LeaderName": "Vex"},
                {"Name": "Traders", "RelationToPlayer": "Neutral", "Description": "Merchants"}
            ],
            "PlayerPawns": [{
                "FullName": "Jane Doe",
                "Gender": "Female",
                "Age": 31,
                "Appearance": {"HairColorLabel": "red", "HairStyle": "Bob"},
                "Backstory": {"Childhood": {"Title": "Urchin"}},
                "Traits": [{"Label": "Kind"}, {"Label": "Tough"}],
                "TopSkills": [{"Name": "Cooking", "Level": 8}, {"Name": "Medicine", "Level": 6}],
                "Relations": [{"Name": "Bob", "Type": "Spouse"}]
            }]
        })
    }

    #[test]
    fn renders_chinese_sections() {
        let formatter = LoreFormatter::embedded().unwrap();
        let md = formatter.render(&lore(), Locale::Zh).unwrap();
        assert!(md.starts_with("# Crashlanded\n> Three survivors.\n> No ship.\n"));
        assert!(md.contains("## 主要派系"));
        assert!(md.contains("### Pirates\n- **与玩家关系**: Hostile\n- **领袖**: Vex\n"));
        assert!(md.contains("- **描述**: Merchants"));
        assert!(md.contains("- **基本信息**: Female, 31岁"));
        assert!(md.contains("- **外观**: red Bob"));
        assert!(md.contains("- **童年**: Urchin"));
        assert!(!md.contains("成年"));
        assert!(md.contains("- **性格特质**: Kind, Tough"));
        assert!(md.contains("- **核心技能**: Cooking (8), Medicine (6)\n"));
        assert!(md.contains("  - 与 Bob 是 Spouse"));
    }

    #[test]
    fn renders_english_sections() {
        let formatter = LoreFormatter::embedded().unwrap();
        let md = formatter.render(&lore(), Locale::En).unwrap();
        assert!(md.contains("## Major Factions"));
        assert!(md.contains("- **Basics**: Female, age 31"));
    }

    #[test]
    fn missing_sections_are_omitted() {
        let formatter = LoreFormatter::embedded().unwrap();
        let md = formatter.render(&json!({"Factions": [{"Name": "A", "RelationToPlayer": "Ally"}]}), Locale::Zh).unwrap();
        assert!(md.starts_with("## 主要派系"));
        assert!(!md.contains("核心人物"));
    }

    #[test]
    fn null_document_reports_no_data() {
        let formatter = LoreFormatter::embedded().unwrap();
        assert_eq!(formatter.render(&Value::Null, Locale::Zh).unwrap(), "没有可用的故事数据。");
    }

    #[test]
    fn overrides_replace_one_locale() {
        let dir = std::env::temp_dir().join(format!("sillyworld-lore-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("lore_en.md.j2"), "Story: {{ Scenario.Name }}").unwrap();
        let formatter = LoreFormatter::with_overrides(&dir).unwrap();
        assert_eq!(formatter.render(&lore(), Locale::En).unwrap(), "Story: Crashlanded");
        assert!(formatter.render(&lore(), Locale::Zh).unwrap().contains("主要派系"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
