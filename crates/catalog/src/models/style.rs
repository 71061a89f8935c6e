use std::collections::BTreeMap;

/// Stored preferences, by key.
pub type Preferences = BTreeMap<String, PreferenceValue>;

/// A single preference or style setting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl From<bool> for PreferenceValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PreferenceValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PreferenceValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A named set of display settings for book lists.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Style {
    pub uuid: String,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub preferred: bool,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    pub settings: Preferences,
}
