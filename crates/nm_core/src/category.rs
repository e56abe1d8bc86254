use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Canonical article taxonomy shared by every provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    General,
    Business,
    Entertainment,
    Health,
    Science,
    Sports,
    Technology,
    Politics,
    Education,
    Lifestyle,
}

/// Provider vocabulary -> canonical category. Keys are lowercase.
/// `world` appears for both NewsData and GNews; both map to `general`.
const CATEGORY_TABLE: &[(&str, Category)] = &[
    // NewsAPI
    ("business", Category::Business),
    ("entertainment", Category::Entertainment),
    ("general", Category::General),
    ("health", Category::Health),
    ("science", Category::Science),
    ("sports", Category::Sports),
    ("technology", Category::Technology),
    // NewsData
    ("top", Category::General),
    ("world", Category::General),
    ("politics", Category::Politics),
    ("crime", Category::General),
    ("domestic", Category::General),
    ("education", Category::Education),
    ("environment", Category::Science),
    ("food", Category::Lifestyle),
    ("lifestyle", Category::Lifestyle),
    ("tourism", Category::Lifestyle),
    // GNews
    ("nation", Category::General),
    // Currents
    ("regional", Category::General),
    ("programming", Category::Technology),
    ("academia", Category::Education),
];

impl Category {
    pub const ALL: [Category; 10] = [
        Self::General,
        Self::Business,
        Self::Entertainment,
        Self::Health,
        Self::Science,
        Self::Sports,
        Self::Technology,
        Self::Politics,
        Self::Education,
        Self::Lifestyle,
    ];

    /// Case-insensitive lookup; anything unknown or missing is `General`.
    pub fn normalize(provider_category: Option<&str>) -> Self {
        let Some(key) = provider_category.map(|c| c.trim().to_lowercase()) else {
            return Self::General;
        };
        CATEGORY_TABLE
            .iter()
            .rev()
            .find(|(name, _)| *name == key)
            .map(|(_, category)| *category)
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Business => "business",
            Self::Entertainment => "entertainment",
            Self::Health => "health",
            Self::Science => "science",
            Self::Sports => "sports",
            Self::Technology => "technology",
            Self::Politics => "politics",
            Self::Education => "education",
            Self::Lifestyle => "lifestyle",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Business => "Business",
            Self::Entertainment => "Entertainment",
            Self::Health => "Health",
            Self::Science => "Science",
            Self::Sports => "Sports",
            Self::Technology => "Technology",
            Self::Politics => "Politics",
            Self::Education => "Education",
            Self::Lifestyle => "Lifestyle",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse of a canonical name, used for API filters. Provider
/// vocabularies go through [`Category::normalize`] instead.
impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| Error::Config(format!("Unknown category: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_entry_is_canonical() {
        for (name, category) in CATEGORY_TABLE {
            assert!(Category::ALL.contains(category), "{} maps outside the canonical set", name);
            assert_eq!(Category::normalize(Some(name)), *category);
        }
    }

    #[test]
    fn test_provider_vocabularies() {
        assert_eq!(Category::normalize(Some("top")), Category::General);
        assert_eq!(Category::normalize(Some("environment")), Category::Science);
        assert_eq!(Category::normalize(Some("tourism")), Category::Lifestyle);
        assert_eq!(Category::normalize(Some("nation")), Category::General);
        assert_eq!(Category::normalize(Some("world")), Category::General);
        assert_eq!(Category::normalize(Some("programming")), Category::Technology);
        assert_eq!(Category::normalize(Some("academia")), Category::Education);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(Category::normalize(Some("Technology")), Category::Technology);
        assert_eq!(Category::normalize(Some(" POLITICS ")), Category::Politics);
    }

    #[test]
    fn test_unknown_maps_to_general() {
        assert_eq!(Category::normalize(None), Category::General);
        assert_eq!(Category::normalize(Some("")), Category::General);
        assert_eq!(Category::normalize(Some("astrology")), Category::General);
    }

    #[test]
    fn test_strict_parse() {
        assert_eq!("Sports".parse::<Category>().unwrap(), Category::Sports);
        assert!("programming".parse::<Category>().is_err());
    }
}
