use crate::{AppInfo, RecordEncoding, RecordType, UpdatePolicy};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// Record types a caller may request. MetaData is handled by the container
/// and Database/AutoDetect only exist on the read side.
pub const EXPORTABLE_TYPES: [RecordType; 9] = [
    RecordType::Styles,
    RecordType::Preferences,
    RecordType::Certificates,
    RecordType::Bookshelves,
    RecordType::Libraries,
    RecordType::CustomFields,
    RecordType::DeletedBooks,
    RecordType::Books,
    RecordType::Cover,
];

fn without_metadata(types: impl IntoIterator<Item = RecordType>) -> BTreeSet<RecordType> {
    types.into_iter().filter(|&ty| ty != RecordType::MetaData).collect()
}

/// What a restore should import, and how collisions are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    record_types: BTreeSet<RecordType>,
    update_policy: UpdatePolicy,
}

impl ImportOptions {
    pub fn new(record_types: impl IntoIterator<Item = RecordType>) -> Self {
        Self { record_types: without_metadata(record_types), update_policy: UpdatePolicy::default() }
    }

    pub fn with_policy(mut self, update_policy: UpdatePolicy) -> Self {
        self.update_policy = update_policy;
        self
    }

    pub fn record_types(&self) -> &BTreeSet<RecordType> {
        &self.record_types
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.update_policy
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::new(EXPORTABLE_TYPES)
    }
}

/// What a backup should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    record_types: BTreeSet<RecordType>,
    since: Option<OffsetDateTime>,
    app: AppInfo,
    book_encoding: RecordEncoding,
}

impl ExportOptions {
    pub fn new(record_types: impl IntoIterator<Item = RecordType>) -> Self {
        Self {
            record_types: without_metadata(record_types),
            since: None,
            app: AppInfo::default(),
            book_encoding: RecordEncoding::Json,
        }
    }

    /// Only export books (and their covers and deletion markers) modified at
    /// or after `since`.
    pub fn incremental_since(mut self, since: OffsetDateTime) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_app(mut self, app: AppInfo) -> Self {
        self.app = app;
        self
    }

    /// Store books as `encoding` instead of JSON. Every other record stays
    /// JSON.
    pub fn with_book_encoding(mut self, encoding: RecordEncoding) -> Self {
        self.book_encoding = encoding;
        self
    }

    pub fn record_types(&self) -> &BTreeSet<RecordType> {
        &self.record_types
    }

    pub fn book_encoding(&self) -> RecordEncoding {
        self.book_encoding
    }

    pub fn since(&self) -> Option<OffsetDateTime> {
        self.since
    }

    pub fn app(&self) -> &AppInfo {
        &self.app
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new(EXPORTABLE_TYPES)
    }
}
