use std::collections::BTreeMap;
use time::OffsetDateTime;

/// A single book in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Book {
    /// Stable identity, preserved across backup and restore
    pub uuid: String,
    pub title: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub isbn: Option<String>,
    /// Author display names, in credit order
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub authors: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub series: Option<String>,
    /// Bookshelves this book sits on, by name
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub bookshelves: Vec<String>,
    /// Library (calibre or similar) this book is synchronised with, by uuid
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub library: Option<String>,
    /// Values of user-defined fields, keyed by [`CustomField::key`](crate::CustomField)
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    pub fields: BTreeMap<String, String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")
    )]
    pub last_modified: Option<OffsetDateTime>,
}

impl Book {
    pub fn new(uuid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            title: title.into(),
            isbn: None,
            authors: Vec::new(),
            series: None,
            bookshelves: Vec::new(),
            library: None,
            fields: BTreeMap::new(),
            last_modified: None,
        }
    }

    pub fn modified_at(mut self, at: OffsetDateTime) -> Self {
        self.last_modified = Some(at);
        self
    }

    pub fn on_shelf(mut self, shelf: impl Into<String>) -> Self {
        self.bookshelves.push(shelf.into());
        self
    }

    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }
}

/// Marker left behind when a book is deleted, so that a restore on another
/// device can delete it too.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct DeletedBook {
    pub uuid: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub deleted_at: OffsetDateTime,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sparse_book_json() {
        let book = Book::new("b-1", "Dune").modified_at(datetime!(2024-03-01 10:00 UTC));
        let json = serde_json::to_string(&book).unwrap();
        assert_eq!(json, r#"{"uuid":"b-1","title":"Dune","last-modified":"2024-03-01T10:00:00Z"}"#);
        let back: Book = serde_json::from_str(&json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn test_missing_optional_fields() {
        let book: Book = serde_json::from_str(r#"{"uuid":"b-2","title":"Emma"}"#).unwrap();
        assert!(book.authors.is_empty());
        assert_eq!(book.last_modified, None);
    }
}
