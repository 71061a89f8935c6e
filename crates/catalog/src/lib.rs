//! Catalog models and the persistence seam that archives read from and write
//! into.
//!
//! The archive engine never sees a database. It only ever talks to a
//! [`Catalog`], which turns one decoded entity into persisted state and back.

pub mod error;
#[cfg(any(test, feature = "mock"))]
mod memory;
pub mod models;

#[cfg(any(test, feature = "mock"))]
pub use crate::memory::MemoryCatalog;
pub use crate::models::*;
use crate::error::Result;
use std::sync::Arc;
use time::OffsetDateTime;

/// Read/write access to the catalog.
///
/// Every `save_*` method is an upsert keyed by the entity's identity (uuid,
/// or name for bookshelves, certificates and covers). Implementations must be
/// usable from a worker thread, so all methods take `&self`.
pub trait Catalog: Send + Sync {
    /// Books modified at or after `since`, or all of them.
    fn books(&self, since: Option<OffsetDateTime>) -> Result<Vec<Book>>;
    fn book(&self, uuid: &str) -> Result<Option<Book>>;
    fn save_book(&self, book: &Book) -> Result<()>;
    /// Delete a book, leaving a [`DeletedBook`] marker. Returns `false` if
    /// there was nothing to delete.
    fn delete_book(&self, uuid: &str, at: OffsetDateTime) -> Result<bool>;
    /// Deletion markers recorded at or after `since`, or all of them.
    fn deleted_books(&self, since: Option<OffsetDateTime>) -> Result<Vec<DeletedBook>>;

    fn bookshelves(&self) -> Result<Vec<Bookshelf>>;
    fn bookshelf(&self, name: &str) -> Result<Option<Bookshelf>>;
    fn save_bookshelf(&self, shelf: &Bookshelf) -> Result<()>;

    fn libraries(&self) -> Result<Vec<Library>>;
    fn library(&self, uuid: &str) -> Result<Option<Library>>;
    fn save_library(&self, library: &Library) -> Result<()>;

    fn custom_fields(&self) -> Result<Vec<CustomField>>;
    fn custom_field(&self, key: &str) -> Result<Option<CustomField>>;
    fn save_custom_field(&self, field: &CustomField) -> Result<()>;

    fn styles(&self) -> Result<Vec<Style>>;
    fn style(&self, uuid: &str) -> Result<Option<Style>>;
    fn save_style(&self, style: &Style) -> Result<()>;

    fn preferences(&self) -> Result<Preferences>;
    /// Merge `preferences` into the stored set, key by key.
    fn save_preferences(&self, preferences: &Preferences) -> Result<()>;

    fn certificates(&self) -> Result<Vec<Certificate>>;
    fn certificate(&self, name: &str) -> Result<Option<Certificate>>;
    fn save_certificate(&self, certificate: &Certificate) -> Result<()>;

    /// Names of covers modified at or after `since`, or all of them.
    fn cover_names(&self, since: Option<OffsetDateTime>) -> Result<Vec<String>>;
    fn cover(&self, name: &str) -> Result<Option<Cover>>;
    fn save_cover(&self, cover: &Cover) -> Result<()>;
}

pub type CatalogHandle = Arc<dyn Catalog>;
