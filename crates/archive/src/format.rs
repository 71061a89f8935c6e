//! Container formats and content sniffing.

use crate::consts::{CSV_NAME_REGEX, JSON_NAME_REGEX, SNIFF_LENGTH};
use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Read;
use std::str::FromStr;
use tome_storage::Resource;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const CSV_LEGACY_MAGIC: &[u8; 6] = b"\"_id\",";
const JSON_MAGIC: &[u8; 2] = b"{\"";

/// The outer archive kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerFormat {
    /// A zip bundle with one entry per record.
    #[default]
    Zip,
    /// A single JSON document holding the envelope and every record.
    Json,
    /// A single SQLite database. Read only.
    #[serde(alias = "db")]
    Sqlite,
    /// A single CSV file of books from older versions. Read only.
    #[serde(rename = "csv")]
    CsvLegacy,
}

impl ContainerFormat {
    /// Proposed file extension, without the leading dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Json => "json",
            Self::Sqlite => "db",
            Self::CsvLegacy => "csv",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Json => "json",
            Self::Sqlite => "sqlite",
            Self::CsvLegacy => "csv",
        }
    }

    /// Detect a format from the leading bytes of a stream.
    ///
    /// The JSON check only recognises the exact shape this crate writes (an
    /// object whose first key follows the brace with no whitespace). It is not
    /// a general JSON sniff.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&ZIP_MAGIC) {
            return Some(Self::Zip);
        }
        if bytes.starts_with(SQLITE_MAGIC) {
            return Some(Self::Sqlite);
        }
        if bytes.starts_with(CSV_LEGACY_MAGIC) {
            return Some(Self::CsvLegacy);
        }
        if bytes.starts_with(JSON_MAGIC) {
            return Some(Self::Json);
        }
        None
    }

    /// Detect a format from a display name. Only the text formats can be
    /// recognised this way; a trailing duplicate marker such as ` (2)` is
    /// tolerated.
    #[must_use]
    pub fn from_display_name(name: &str) -> Option<Self> {
        if CSV_NAME_REGEX.is_match(name) {
            return Some(Self::CsvLegacy);
        }
        if JSON_NAME_REGEX.is_match(name) {
            return Some(Self::Json);
        }
        None
    }

    /// Detect the format of a resource: sniff up to 512 leading bytes, then
    /// fall back to the display name.
    ///
    /// Returns `Ok(None)` when neither is conclusive. Network locators are
    /// rejected outright.
    #[tracing::instrument(level = "debug", skip(resource), fields(resource = resource.display_name()))]
    pub fn detect(resource: &dyn Resource) -> Result<Option<Self>> {
        if resource.location().is_remote() {
            exn::bail!(ErrorKind::format(format!(
                "archives cannot be read from a network location: {}",
                resource.location()
            )));
        }
        let mut head = Vec::with_capacity(SNIFF_LENGTH as usize);
        resource
            .reader()
            .map_err(ErrorKind::storage)?
            .take(SNIFF_LENGTH)
            .read_to_end(&mut head)
            .map_err(ErrorKind::io)?;
        let detected = Self::from_magic_bytes(&head).or_else(|| Self::from_display_name(resource.display_name()));
        tracing::debug!(format = ?detected, sniffed = head.len(), "detected container format");
        Ok(detected)
    }
}

impl FromStr for ContainerFormat {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "json" => Ok(Self::Json),
            "sqlite" | "db" => Ok(Self::Sqlite),
            "csv" => Ok(Self::CsvLegacy),
            _ => exn::bail!(ErrorKind::format(format!("unknown container format: {s}"))),
        }
    }
}

impl Display for ContainerFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ContainerFormat {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}
