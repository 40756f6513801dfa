//! Output language for narrative text, keywords and lore.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported output languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Simplified Chinese.
    #[default]
    Zh,
    /// English.
    En,
}

impl Locale {
    /// Language code sent to the game's HTTP endpoints.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }
}

impl core::fmt::Display for Locale {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when a language code is not supported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported locale: {0}")]
pub struct UnknownLocale(pub String);

impl FromStr for Locale {
    type Err = UnknownLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" => Ok(Self::Zh),
            "en" | "en-us" | "en_us" => Ok(Self::En),
            other => Err(UnknownLocale(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_codes() {
        assert_eq!("zh".parse::<Locale>(), Ok(Locale::Zh));
        assert_eq!("EN".parse::<Locale>(), Ok(Locale::En));
        assert_eq!("zh-CN".parse::<Locale>(), Ok(Locale::Zh));
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn unknown_codes_report_the_normalised_input() {
        let err = " FR ".parse::<Locale>().unwrap_err();
        assert_eq!(err, UnknownLocale("fr".to_owned()));
        assert_eq!(err.to_string(), "unsupported locale: fr");
    }

    #[test]
    fn defaults_to_chinese() {
        assert_eq!(Locale::default(), Locale::Zh);
        assert_eq!(Locale::En.to_string(), "en");
    }
}
