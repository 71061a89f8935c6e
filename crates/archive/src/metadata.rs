//! The archive envelope: a flat map of scalars describing the archive itself.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Version written by this crate.
pub const ARCHIVER_VERSION: i64 = 5;
/// Versions this crate can read.
pub const SUPPORTED_VERSIONS: RangeInclusive<i64> = 1..=ARCHIVER_VERSION;

pub const ARCHIVER_VERSION_KEY: &str = "archiver-version";
pub const DATABASE_VERSION_KEY: &str = "database-version";
pub const APP_PACKAGE_KEY: &str = "app-package";
pub const APP_VERSION_NAME_KEY: &str = "app-version-name";
pub const APP_VERSION_CODE_KEY: &str = "app-version-code";
pub const PLATFORM_INFO_KEY: &str = "platform-info";
pub const CREATED_AT_KEY: &str = "created-at";
pub const BOOK_COUNT_KEY: &str = "book-count";
pub const COVER_COUNT_KEY: &str = "cover-count";

const CREATED_AT_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// A single envelope value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Identity of the application producing an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub package: String,
    pub version_name: String,
    pub version_code: i64,
    pub database_version: i64,
    pub platform: i64,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            package: env!("CARGO_PKG_NAME").to_string(),
            version_name: env!("CARGO_PKG_VERSION").to_string(),
            version_code: 1,
            database_version: 1,
            platform: 0,
        }
    }
}

/// The metadata envelope.
///
/// Valid only when [`ARCHIVER_VERSION_KEY`] is present. Book and cover counts
/// are omitted rather than written as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaData(BTreeMap<String, Scalar>);

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope for a new archive, stamped with the local time.
    pub fn for_export(app: &AppInfo) -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let created = PrimitiveDateTime::new(now.date(), now.time());
        let mut metadata = Self::new();
        metadata.insert(ARCHIVER_VERSION_KEY, ARCHIVER_VERSION);
        metadata.insert(DATABASE_VERSION_KEY, app.database_version);
        metadata.insert(APP_PACKAGE_KEY, app.package.as_str());
        metadata.insert(APP_VERSION_NAME_KEY, app.version_name.as_str());
        metadata.insert(APP_VERSION_CODE_KEY, app.version_code);
        metadata.insert(PLATFORM_INFO_KEY, app.platform);
        if let Ok(formatted) = created.format(CREATED_AT_FORMAT) {
            metadata.insert(CREATED_AT_KEY, formatted);
        }
        metadata
    }

    /// Record entity counts, dropping either key when its count is zero.
    pub fn with_counts(mut self, books: u64, covers: u64) -> Self {
        for (key, count) in [(BOOK_COUNT_KEY, books), (COVER_COUNT_KEY, covers)] {
            match i64::try_from(count) {
                Ok(count) if count > 0 => self.insert(key, count),
                _ => {
                    self.0.remove(key);
                },
            }
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Integer value of `key`, accepting numbers written as text.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Scalar::Int(value) => Some(*value),
            Scalar::Text(text) => text.trim().parse().ok(),
            Scalar::Bool(_) => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn archiver_version(&self) -> Option<i64> {
        self.int(ARCHIVER_VERSION_KEY)
    }

    pub fn database_version(&self) -> Option<i64> {
        self.int(DATABASE_VERSION_KEY)
    }

    pub fn app_package(&self) -> Option<&str> {
        self.text(APP_PACKAGE_KEY)
    }

    pub fn app_version_name(&self) -> Option<&str> {
        self.text(APP_VERSION_NAME_KEY)
    }

    /// The producing app's version code.
    ///
    /// Older archives stored it as a signed 32-bit value, so large codes can
    /// show up negative; those are reinterpreted as unsigned.
    pub fn app_version_code(&self) -> Option<i64> {
        let code = self.int(APP_VERSION_CODE_KEY)?;
        match i32::try_from(code) {
            Ok(legacy) if legacy < 0 => Some(i64::from(legacy as u32)),
            _ => Some(code),
        }
    }

    pub fn platform_info(&self) -> Option<i64> {
        self.int(PLATFORM_INFO_KEY)
    }

    /// Local creation time, if present and well formed.
    pub fn created_at(&self) -> Option<PrimitiveDateTime> {
        PrimitiveDateTime::parse(self.text(CREATED_AT_KEY)?, CREATED_AT_FORMAT).ok()
    }

    pub fn book_count(&self) -> Option<u64> {
        self.int(BOOK_COUNT_KEY).and_then(|count| u64::try_from(count).ok())
    }

    pub fn cover_count(&self) -> Option<u64> {
        self.int(COVER_COUNT_KEY).and_then(|count| u64::try_from(count).ok())
    }

    /// Check the envelope can be restored by this crate, returning the
    /// archiver version.
    pub fn validate(&self) -> Result<i64> {
        let Some(version) = self.archiver_version() else {
            exn::bail!(ErrorKind::Format(None));
        };
        if !SUPPORTED_VERSIONS.contains(&version) {
            exn::bail!(ErrorKind::format(format!("unsupported archive version {version}")));
        }
        Ok(version)
    }
}

impl FromIterator<(String, Scalar)> for MetaData {
    fn from_iter<T: IntoIterator<Item = (String, Scalar)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_export_envelope() {
        let metadata = MetaData::for_export(&AppInfo::default()).with_counts(10, 0);
        assert_eq!(metadata.validate().unwrap(), ARCHIVER_VERSION);
        assert_eq!(metadata.book_count(), Some(10));
        assert_eq!(metadata.get(COVER_COUNT_KEY), None);
        assert!(metadata.created_at().is_some());
        assert_eq!(metadata.app_package(), Some("tome-archive"));
    }

    #[test]
    fn test_zero_counts_are_removed() {
        let metadata = MetaData::new().with_counts(3, 4).with_counts(0, 0);
        assert_eq!(metadata.get(BOOK_COUNT_KEY), None);
        assert_eq!(metadata.get(COVER_COUNT_KEY), None);
    }

    #[rstest]
    #[case(Scalar::Int(2_000_000_000), Some(2_000_000_000))]
    #[case(Scalar::Int(-1), Some(4_294_967_295))]
    #[case(Scalar::Int(5_000_000_000), Some(5_000_000_000))]
    #[case(Scalar::Text("42".into()), Some(42))]
    #[case(Scalar::Bool(true), None)]
    fn test_version_code(#[case] stored: Scalar, #[case] expected: Option<i64>) {
        let mut metadata = MetaData::new();
        metadata.insert(APP_VERSION_CODE_KEY, stored);
        assert_eq!(metadata.app_version_code(), expected);
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some(0), false)]
    #[case(Some(1), true)]
    #[case(Some(5), true)]
    #[case(Some(6), false)]
    fn test_validate(#[case] version: Option<i64>, #[case] ok: bool) {
        let mut metadata = MetaData::new();
        if let Some(version) = version {
            metadata.insert(ARCHIVER_VERSION_KEY, version);
        }
        assert_eq!(metadata.validate().is_ok(), ok);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"archiver-version":2,"app-package":"com.example","book-count":"12"}"#;
        let metadata: MetaData = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.archiver_version(), Some(2));
        assert_eq!(metadata.book_count(), Some(12));
        assert_eq!(serde_json::to_string(&metadata).unwrap(), r#"{"app-package":"com.example","archiver-version":2,"book-count":"12"}"#);
    }
}
