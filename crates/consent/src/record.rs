//! The persisted consent record and its category flags.

use serde::{Deserialize, Serialize};

/// Current record layout version.
pub const CONSENT_SCHEMA_VERSION: u32 = 1;

/// Maximum age of a consent record: 365 days in milliseconds.
pub const CONSENT_MAX_AGE_MS: i64 = 31_536_000_000;

/// One of the four fixed consent categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Essential,
    Analytics,
    Marketing,
    Personalization,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Self::Essential,
        Self::Analytics,
        Self::Marketing,
        Self::Personalization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Analytics => "analytics",
            Self::Marketing => "marketing",
            Self::Personalization => "personalization",
        }
    }

    /// Parses a category id. Unknown ids yield `None`.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim() {
            "essential" => Some(Self::Essential),
            "analytics" => Some(Self::Analytics),
            "marketing" => Some(Self::Marketing),
            "personalization" => Some(Self::Personalization),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privacy regime of the visitor at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "CA")]
    Ca,
}

impl Region {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eu => "EU",
            Self::Ca => "CA",
        }
    }
}

/// Consent flags for the four categories.
///
/// `essential` has no storage of its own: it is always granted, always
/// serialized as `true`, and a stored `false` reads back as `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "CategoriesWire", into = "CategoriesWire")]
pub struct ConsentCategories {
    pub analytics: bool,
    pub marketing: bool,
    pub personalization: bool,
}

impl ConsentCategories {
    /// Only essential granted.
    pub fn essential_only() -> Self {
        Self::default()
    }

    pub fn all_granted() -> Self {
        Self {
            analytics: true,
            marketing: true,
            personalization: true,
        }
    }

    #[inline]
    pub fn essential(&self) -> bool {
        true
    }

    pub fn is_granted(&self, category: Category) -> bool {
        match category {
            Category::Essential => true,
            Category::Analytics => self.analytics,
            Category::Marketing => self.marketing,
            Category::Personalization => self.personalization,
        }
    }

    /// Categories currently granted, in canonical order.
    pub fn granted(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|category| self.is_granted(*category))
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct CategoriesWire {
    #[serde(default = "always_true")]
    essential: bool,
    #[serde(default)]
    analytics: bool,
    #[serde(default)]
    marketing: bool,
    #[serde(default)]
    personalization: bool,
}

fn always_true() -> bool {
    true
}

impl From<CategoriesWire> for ConsentCategories {
    fn from(wire: CategoriesWire) -> Self {
        Self {
            analytics: wire.analytics,
            marketing: wire.marketing,
            personalization: wire.personalization,
        }
    }
}

impl From<ConsentCategories> for CategoriesWire {
    fn from(categories: ConsentCategories) -> Self {
        Self {
            essential: true,
            analytics: categories.analytics,
            marketing: categories.marketing,
            personalization: categories.personalization,
        }
    }
}

/// Partial category input from a user action.
///
/// Omitted categories resolve to `false`; `essential` is accepted so callers
/// can pass a full map, but it is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsentSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalization: Option<bool>,
}

impl ConsentSelection {
    pub fn accept_all() -> Self {
        Self::from(ConsentCategories::all_granted())
    }

    pub fn reject_all() -> Self {
        Self::from(ConsentCategories::essential_only())
    }

    pub fn resolve(&self) -> ConsentCategories {
        ConsentCategories {
            analytics: self.analytics.unwrap_or(false),
            marketing: self.marketing.unwrap_or(false),
            personalization: self.personalization.unwrap_or(false),
        }
    }
}

impl From<ConsentCategories> for ConsentSelection {
    fn from(categories: ConsentCategories) -> Self {
        Self {
            essential: Some(true),
            analytics: Some(categories.analytics),
            marketing: Some(categories.marketing),
            personalization: Some(categories.personalization),
        }
    }
}

/// The single persisted consent unit. Every save replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    pub schema_version: u32,
    /// Epoch milliseconds when consent was given.
    pub captured_at: i64,
    pub region: Option<Region>,
    pub categories: ConsentCategories,
    pub config_fingerprint: String,
}

impl ConsentRecord {
    /// Age check against `now`. A record exactly `CONSENT_MAX_AGE_MS` old is
    /// still fresh.
    pub fn is_fresh(&self, now_millis: i64) -> bool {
        now_millis.saturating_sub(self.captured_at) <= CONSENT_MAX_AGE_MS
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
