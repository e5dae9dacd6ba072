//! Banner configuration handed in by the plugin layer.
//!
//! The CMS plugin renders its settings into a JSON object on the page. This
//! module deserializes that object, validates the category list and derives
//! the configuration fingerprint stored alongside every consent record.

use std::collections::HashSet;
use std::hash::Hasher;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::error::{ConsentError, Result};
use crate::record::{Category, Region};

/// Default key for both the primary store entry and the fallback cookie.
pub const DEFAULT_STORAGE_KEY: &str = "consent_preferences";

/// A category as the site owner configured it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl CategoryDefinition {
    pub fn new(category: Category, label: &str, required: bool) -> Self {
        Self {
            id: category.as_str().to_string(),
            label: label.to_string(),
            description: String::new(),
            required,
        }
    }
}

/// Geo targeting rules for banner visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoConfig {
    /// When false the banner is shown everywhere.
    pub enabled: bool,
    /// Regions that must see the banner.
    pub regions: Vec<Region>,
    /// Decision for visitors whose region could not be detected.
    pub show_when_unknown: bool,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            regions: vec![Region::Eu, Region::Ca],
            show_when_unknown: true,
        }
    }
}

/// Active banner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsentConfig {
    pub categories: Vec<CategoryDefinition>,
    /// Region detected for the current visitor.
    pub region: Option<Region>,
    pub geo: GeoConfig,
    pub storage_key: String,
    pub cookie_name: String,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            categories: vec![
                CategoryDefinition::new(Category::Essential, "Essential", true),
                CategoryDefinition::new(Category::Analytics, "Analytics", false),
                CategoryDefinition::new(Category::Marketing, "Marketing", false),
                CategoryDefinition::new(Category::Personalization, "Personalization", false),
            ],
            region: None,
            geo: GeoConfig::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            cookie_name: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl ConsentConfig {
    /// Parses and validates the plugin's JSON configuration object.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_key.is_empty() {
            return Err(ConsentError::InvalidConfig("storage key is empty".to_string()));
        }
        if self.cookie_name.is_empty()
            || self
                .cookie_name
                .contains(|c: char| c == '=' || c == ';' || c == ',' || c.is_whitespace())
        {
            return Err(ConsentError::InvalidConfig(format!(
                "invalid cookie name {:?}",
                self.cookie_name
            )));
        }

        let mut seen = HashSet::new();
        let mut essential_required = false;
        for definition in &self.categories {
            let category = Category::from_id(&definition.id).ok_or_else(|| {
                ConsentError::InvalidConfig(format!("unknown category {:?}", definition.id))
            })?;
            if !seen.insert(category) {
                return Err(ConsentError::InvalidConfig(format!(
                    "duplicate category {category}"
                )));
            }
            if category == Category::Essential {
                essential_required = definition.required;
            }
        }
        if !essential_required {
            return Err(ConsentError::InvalidConfig(
                "essential category must be present and required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn category(&self, category: Category) -> Option<&CategoryDefinition> {
        self.categories
            .iter()
            .find(|definition| definition.id == category.as_str())
    }

    /// Summarizes the category definitions so stored consent can be
    /// invalidated when the site owner changes them.
    ///
    /// FNV-1a 64 over `id|label|required` lines sorted by id. Descriptions
    /// are display copy and do not participate.
    pub fn fingerprint(&self) -> String {
        let mut lines: Vec<String> = self
            .categories
            .iter()
            .map(|definition| {
                format!(
                    "{}|{}|{}",
                    definition.id.trim(),
                    definition.label.trim(),
                    definition.required
                )
            })
            .collect();
        lines.sort_unstable();

        let mut hasher = FnvHasher::default();
        for line in &lines {
            hasher.write(line.as_bytes());
            hasher.write_u8(b'\n');
        }
        format!("{:016x}", hasher.finish())
    }
}
