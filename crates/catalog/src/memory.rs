//! In-memory catalog for testing.

use crate::error::{ErrorKind, Result};
use crate::models::*;
use crate::Catalog;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct State {
    books: BTreeMap<String, Book>,
    deleted: BTreeMap<String, DeletedBook>,
    bookshelves: BTreeMap<String, Bookshelf>,
    libraries: BTreeMap<String, Library>,
    custom_fields: BTreeMap<String, CustomField>,
    styles: BTreeMap<String, Style>,
    preferences: Preferences,
    certificates: BTreeMap<String, Certificate>,
    covers: BTreeMap<String, Cover>,
}

/// In-memory catalog for testing.
///
/// Everything lives in ordered maps behind one [`RwLock`], so exports come
/// out in a stable order. Books with an empty uuid or title are rejected the
/// way a real store would reject them.
///
/// # Examples
///
/// ```
/// use tome_catalog::{Book, Catalog, MemoryCatalog};
///
/// let catalog = MemoryCatalog::default().with_books([Book::new("b-1", "Dune")]);
/// assert_eq!(catalog.books(None).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<State>,
}

impl MemoryCatalog {
    /// Panics if any book would be rejected. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_books(self, books: impl IntoIterator<Item = Book>) -> Self {
        for book in books {
            if let Err(err) = self.save_book(&book) {
                panic!("MemoryCatalog::with_books: {err}");
            }
        }
        self
    }

    pub fn with_bookshelves(self, shelves: impl IntoIterator<Item = Bookshelf>) -> Self {
        self.write().bookshelves.extend(shelves.into_iter().map(|shelf| (shelf.name.clone(), shelf)));
        self
    }

    pub fn with_libraries(self, libraries: impl IntoIterator<Item = Library>) -> Self {
        self.write().libraries.extend(libraries.into_iter().map(|library| (library.uuid.clone(), library)));
        self
    }

    pub fn with_styles(self, styles: impl IntoIterator<Item = Style>) -> Self {
        self.write().styles.extend(styles.into_iter().map(|style| (style.uuid.clone(), style)));
        self
    }

    pub fn with_preferences(self, preferences: Preferences) -> Self {
        self.write().preferences.extend(preferences);
        self
    }

    pub fn with_covers(self, covers: impl IntoIterator<Item = Cover>) -> Self {
        self.write().covers.extend(covers.into_iter().map(|cover| (cover.name.clone(), cover)));
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn since_filter(since: Option<OffsetDateTime>, at: Option<OffsetDateTime>) -> bool {
    match (since, at) {
        (None, _) => true,
        (Some(since), Some(at)) => at >= since,
        (Some(_), None) => false,
    }
}

impl Catalog for MemoryCatalog {
    fn books(&self, since: Option<OffsetDateTime>) -> Result<Vec<Book>> {
        Ok(self.read().books.values().filter(|book| since_filter(since, book.last_modified)).cloned().collect())
    }

    fn book(&self, uuid: &str) -> Result<Option<Book>> {
        Ok(self.read().books.get(uuid).cloned())
    }

    fn save_book(&self, book: &Book) -> Result<()> {
        if book.uuid.trim().is_empty() {
            exn::bail!(ErrorKind::invalid("book", "missing uuid"));
        }
        if book.title.trim().is_empty() {
            exn::bail!(ErrorKind::invalid("book", format!("{} has no title", book.uuid)));
        }
        let mut state = self.write();
        state.deleted.remove(&book.uuid);
        state.books.insert(book.uuid.clone(), book.clone());
        Ok(())
    }

    fn delete_book(&self, uuid: &str, at: OffsetDateTime) -> Result<bool> {
        let mut state = self.write();
        let existed = state.books.remove(uuid).is_some();
        state.deleted.insert(uuid.to_string(), DeletedBook { uuid: uuid.to_string(), deleted_at: at });
        Ok(existed)
    }

    fn deleted_books(&self, since: Option<OffsetDateTime>) -> Result<Vec<DeletedBook>> {
        Ok(self.read().deleted.values().filter(|d| since_filter(since, Some(d.deleted_at))).cloned().collect())
    }

    fn bookshelves(&self) -> Result<Vec<Bookshelf>> {
        Ok(self.read().bookshelves.values().cloned().collect())
    }

    fn bookshelf(&self, name: &str) -> Result<Option<Bookshelf>> {
        Ok(self.read().bookshelves.get(name).cloned())
    }

    fn save_bookshelf(&self, shelf: &Bookshelf) -> Result<()> {
        if shelf.name.trim().is_empty() {
            exn::bail!(ErrorKind::invalid("bookshelf", "missing name"));
        }
        self.write().bookshelves.insert(shelf.name.clone(), shelf.clone());
        Ok(())
    }

    fn libraries(&self) -> Result<Vec<Library>> {
        Ok(self.read().libraries.values().cloned().collect())
    }

    fn library(&self, uuid: &str) -> Result<Option<Library>> {
        Ok(self.read().libraries.get(uuid).cloned())
    }

    fn save_library(&self, library: &Library) -> Result<()> {
        self.write().libraries.insert(library.uuid.clone(), library.clone());
        Ok(())
    }

    fn custom_fields(&self) -> Result<Vec<CustomField>> {
        Ok(self.read().custom_fields.values().cloned().collect())
    }

    fn custom_field(&self, key: &str) -> Result<Option<CustomField>> {
        Ok(self.read().custom_fields.get(key).cloned())
    }

    fn save_custom_field(&self, field: &CustomField) -> Result<()> {
        self.write().custom_fields.insert(field.key.clone(), field.clone());
        Ok(())
    }

    fn styles(&self) -> Result<Vec<Style>> {
        Ok(self.read().styles.values().cloned().collect())
    }

    fn style(&self, uuid: &str) -> Result<Option<Style>> {
        Ok(self.read().styles.get(uuid).cloned())
    }

    fn save_style(&self, style: &Style) -> Result<()> {
        self.write().styles.insert(style.uuid.clone(), style.clone());
        Ok(())
    }

    fn preferences(&self) -> Result<Preferences> {
        Ok(self.read().preferences.clone())
    }

    fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        self.write().preferences.extend(preferences.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn certificates(&self) -> Result<Vec<Certificate>> {
        Ok(self.read().certificates.values().cloned().collect())
    }

    fn certificate(&self, name: &str) -> Result<Option<Certificate>> {
        Ok(self.read().certificates.get(name).cloned())
    }

    fn save_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.write().certificates.insert(certificate.name.clone(), certificate.clone());
        Ok(())
    }

    fn cover_names(&self, since: Option<OffsetDateTime>) -> Result<Vec<String>> {
        Ok(self.read().covers.values().filter(|c| since_filter(since, c.modified)).map(|c| c.name.clone()).collect())
    }

    fn cover(&self, name: &str) -> Result<Option<Cover>> {
        Ok(self.read().covers.get(name).cloned())
    }

    fn save_cover(&self, cover: &Cover) -> Result<()> {
        self.write().covers.insert(cover.name.clone(), cover.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    #[rstest]
    #[case(None, 3)]
    #[case(Some(datetime!(2024-01-01 0:00 UTC)), 2)]
    #[case(Some(datetime!(2024-06-01 0:00 UTC)), 1)]
    #[case(Some(datetime!(2025-01-01 0:00 UTC)), 0)]
    fn test_books_since(#[case] since: Option<OffsetDateTime>, #[case] expected: usize) {
        let catalog = MemoryCatalog::default().with_books([
            Book::new("a", "Undated"),
            Book::new("b", "January").modified_at(datetime!(2024-01-01 0:00 UTC)),
            Book::new("c", "June").modified_at(datetime!(2024-06-01 0:00 UTC)),
        ]);
        assert_eq!(catalog.books(since).unwrap().len(), expected);
    }

    #[test]
    fn test_rejects_untitled_book() {
        let catalog = MemoryCatalog::default();
        let err = catalog.save_book(&Book::new("b-1", " ")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { entity: "book", .. }));
        assert!(catalog.book("b-1").unwrap().is_none());
    }

    #[test]
    fn test_delete_leaves_marker() {
        let at = datetime!(2024-02-02 12:00 UTC);
        let catalog = MemoryCatalog::default().with_books([Book::new("b-1", "Dune")]);
        assert!(catalog.delete_book("b-1", at).unwrap());
        assert!(!catalog.delete_book("b-1", at).unwrap());
        assert_eq!(catalog.deleted_books(None).unwrap(), vec![DeletedBook { uuid: "b-1".into(), deleted_at: at }]);

        catalog.save_book(&Book::new("b-1", "Dune")).unwrap();
        assert!(catalog.deleted_books(None).unwrap().is_empty());
    }

    #[test]
    fn test_preferences_merge() {
        let catalog = MemoryCatalog::default()
            .with_preferences(Preferences::from([("theme".to_string(), "dark".into())]));
        catalog.save_preferences(&Preferences::from([("grid".to_string(), true.into())])).unwrap();
        assert_eq!(catalog.preferences().unwrap().len(), 2);
    }
}
