//! Applying decoded entities to the catalog, one at a time.

use crate::policy::Resolution;
use crate::{Counters, ReadResults, RecordType, UpdatePolicy};
use std::collections::BTreeSet;
use std::fmt::Display;
use time::OffsetDateTime;
use tome_catalog::error::Result as CatalogResult;
use tome_catalog::{Book, Bookshelf, Catalog, Certificate, Cover, CustomField, DeletedBook, Library, Preferences, Style};

/// Applies the update policy to each incoming entity and keeps score.
///
/// Nothing here returns an error: an entity the catalog rejects is counted as
/// failed, logged, and the next one is tried.
pub(crate) struct Importer<'a> {
    catalog: &'a dyn Catalog,
    allowed: &'a BTreeSet<RecordType>,
    policy: UpdatePolicy,
    results: ReadResults,
}

impl<'a> Importer<'a> {
    pub(crate) fn new(catalog: &'a dyn Catalog, allowed: &'a BTreeSet<RecordType>, policy: UpdatePolicy) -> Self {
        Self { catalog, allowed, policy, results: ReadResults::default() }
    }

    pub(crate) fn allows(&self, ty: RecordType) -> bool {
        self.allowed.contains(&ty)
    }

    pub(crate) fn finish(self) -> ReadResults {
        self.results
    }

    fn counters(&mut self, ty: RecordType) -> &mut Counters {
        self.results.counters_mut(ty)
    }

    /// Count an entity that could not be decoded or stored.
    pub(crate) fn failed(&mut self, ty: RecordType, index: usize, reason: impl Display) {
        tracing::warn!(record = %ty, index, %reason, "entity failed to import");
        let counters = self.counters(ty);
        counters.processed += 1;
        counters.failed += 1;
    }

    /// Shared collision handling: look up, resolve, save, count.
    fn apply(
        &mut self,
        ty: RecordType,
        index: usize,
        existing: CatalogResult<Option<Option<OffsetDateTime>>>,
        incoming: Option<OffsetDateTime>,
        save: impl FnOnce(&dyn Catalog) -> CatalogResult<()>,
    ) -> bool {
        let existing = match existing {
            Ok(existing) => existing,
            Err(err) => {
                self.failed(ty, index, &*err);
                return false;
            },
        };
        let resolution = self.policy.resolve(existing, incoming);
        if resolution == Resolution::Skip {
            let counters = self.counters(ty);
            counters.processed += 1;
            counters.skipped += 1;
            return false;
        }
        if let Err(err) = save(self.catalog) {
            self.failed(ty, index, &*err);
            return false;
        }
        let counters = self.counters(ty);
        counters.processed += 1;
        match resolution {
            Resolution::Create => counters.created += 1,
            _ => counters.updated += 1,
        }
        true
    }

    pub(crate) fn book(&mut self, index: usize, book: &Book) -> bool {
        if book.uuid.trim().is_empty() {
            self.failed(RecordType::Books, index, "book has no uuid");
            return false;
        }
        let existing = self.catalog.book(&book.uuid).map(|found| found.map(|b| b.last_modified));
        let catalog = self.catalog;
        let saved = self.apply(RecordType::Books, index, existing, book.last_modified, |catalog| catalog.save_book(book));
        if saved {
            for name in &book.bookshelves {
                if let Ok(None) = catalog.bookshelf(name) {
                    tracing::debug!(bookshelf = %name, book = %book.uuid, "creating referenced bookshelf");
                    if let Err(err) = catalog.save_bookshelf(&Bookshelf::new(name.as_str())) {
                        let reason = &*err;
                        tracing::warn!(bookshelf = %name, %reason, "could not create referenced bookshelf");
                    }
                }
            }
        }
        saved
    }

    /// A deletion marker removes the local book unless it was modified after
    /// the deletion. Applied markers count as updated when a book was removed
    /// and created when only the marker was recorded.
    pub(crate) fn deleted_book(&mut self, index: usize, marker: &DeletedBook) {
        let ty = RecordType::DeletedBooks;
        let local = match self.catalog.book(&marker.uuid) {
            Ok(local) => local,
            Err(err) => return self.failed(ty, index, &*err),
        };
        if let Some(modified) = local.as_ref().and_then(|book| book.last_modified)
            && modified > marker.deleted_at
        {
            let counters = self.counters(ty);
            counters.processed += 1;
            counters.skipped += 1;
            return;
        }
        match self.catalog.delete_book(&marker.uuid, marker.deleted_at) {
            Ok(removed) => {
                let counters = self.counters(ty);
                counters.processed += 1;
                match removed {
                    true => counters.updated += 1,
                    false => counters.created += 1,
                }
            },
            Err(err) => self.failed(ty, index, &*err),
        }
    }

    pub(crate) fn bookshelf(&mut self, index: usize, shelf: &Bookshelf) {
        let existing = self.catalog.bookshelf(&shelf.name).map(|found| found.map(|_| None));
        self.apply(RecordType::Bookshelves, index, existing, None, |catalog| catalog.save_bookshelf(shelf));
    }

    pub(crate) fn library(&mut self, index: usize, library: &Library) {
        let existing = self.catalog.library(&library.uuid).map(|found| found.map(|_| None));
        self.apply(RecordType::Libraries, index, existing, None, |catalog| catalog.save_library(library));
    }

    pub(crate) fn custom_field(&mut self, index: usize, field: &CustomField) {
        let existing = self.catalog.custom_field(&field.key).map(|found| found.map(|_| None));
        self.apply(RecordType::CustomFields, index, existing, None, |catalog| catalog.save_custom_field(field));
    }

    pub(crate) fn style(&mut self, index: usize, style: &Style) {
        let existing = self.catalog.style(&style.uuid).map(|found| found.map(|_| None));
        self.apply(RecordType::Styles, index, existing, None, |catalog| catalog.save_style(style));
    }

    pub(crate) fn certificate(&mut self, index: usize, certificate: &Certificate) {
        let existing = self.catalog.certificate(&certificate.name).map(|found| found.map(|_| None));
        self.apply(RecordType::Certificates, index, existing, None, |catalog| catalog.save_certificate(certificate));
    }

    /// Preferences are reconciled key by key.
    pub(crate) fn preferences(&mut self, preferences: &Preferences) {
        let current = match self.catalog.preferences() {
            Ok(current) => current,
            Err(err) => return self.failed(RecordType::Preferences, 0, &*err),
        };
        for (index, (key, value)) in preferences.iter().enumerate() {
            let existing = Ok(current.get(key).map(|_| None));
            let single = Preferences::from([(key.clone(), value.clone())]);
            self.apply(RecordType::Preferences, index, existing, None, |catalog| catalog.save_preferences(&single));
        }
    }

    pub(crate) fn cover(&mut self, index: usize, cover: &Cover) {
        let existing = self.catalog.cover(&cover.name).map(|found| found.map(|c| c.modified));
        self.apply(RecordType::Cover, index, existing, cover.modified, |catalog| catalog.save_cover(cover));
    }
}
