//! Per-session accumulators.
//!
//! Results from each record are folded into a session total with `+=`.
//! Addition is component-wise, so folding order never matters.

use crate::RecordType;
use std::collections::BTreeSet;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// How a session ended. Cancellation is not a failure: whatever was folded
/// before the cancellation was noticed is still returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled(T),
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn results(&self) -> &T {
        match self {
            Self::Completed(results) | Self::Cancelled(results) => results,
        }
    }

    pub fn into_results(self) -> T {
        match self {
            Self::Completed(results) | Self::Cancelled(results) => results,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(results) => Outcome::Completed(f(results)),
            Self::Cancelled(results) => Outcome::Cancelled(f(results)),
        }
    }
}

/// Counters for one kind of entity during a restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Every entity seen, whatever happened to it
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    /// Collided with an existing entity that the policy kept
    pub skipped: u64,
    /// Malformed, or rejected by the catalog
    pub failed: u64,
}

impl Add for Counters {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.created += rhs.created;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// Totals for a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadResults {
    pub books: Counters,
    pub covers: Counters,
    pub styles: Counters,
    pub preferences: Counters,
    pub certificates: Counters,
    pub bookshelves: Counters,
    pub libraries: Counters,
    pub custom_fields: Counters,
    pub deleted_books: Counters,
    /// Entries whose type or encoding was not recognised
    pub records_skipped: u64,
}

impl ReadResults {
    /// Counters for entities of `ty`.
    ///
    /// Records that are not an entity kind of their own (a database, a
    /// multi-section bundle, the envelope) are attributed to books.
    pub fn counters_mut(&mut self, ty: RecordType) -> &mut Counters {
        match ty {
            RecordType::Cover => &mut self.covers,
            RecordType::Styles => &mut self.styles,
            RecordType::Preferences => &mut self.preferences,
            RecordType::Certificates => &mut self.certificates,
            RecordType::Bookshelves => &mut self.bookshelves,
            RecordType::Libraries => &mut self.libraries,
            RecordType::CustomFields => &mut self.custom_fields,
            RecordType::DeletedBooks => &mut self.deleted_books,
            RecordType::Books | RecordType::MetaData | RecordType::Database | RecordType::AutoDetect => {
                &mut self.books
            },
        }
    }

    /// Total failed entities across every kind.
    pub fn failed(&self) -> u64 {
        [
            self.books,
            self.covers,
            self.styles,
            self.preferences,
            self.certificates,
            self.bookshelves,
            self.libraries,
            self.custom_fields,
            self.deleted_books,
        ]
        .iter()
        .map(|counters| counters.failed)
        .sum()
    }
}

impl Add for ReadResults {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for ReadResults {
    fn add_assign(&mut self, rhs: Self) {
        self.books += rhs.books;
        self.covers += rhs.covers;
        self.styles += rhs.styles;
        self.preferences += rhs.preferences;
        self.certificates += rhs.certificates;
        self.bookshelves += rhs.bookshelves;
        self.libraries += rhs.libraries;
        self.custom_fields += rhs.custom_fields;
        self.deleted_books += rhs.deleted_books;
        self.records_skipped += rhs.records_skipped;
    }
}

impl Sum for ReadResults {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Totals for a backup: how many entities of each kind were written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResults {
    pub books: u64,
    pub covers: u64,
    pub styles: u64,
    pub preferences: u64,
    pub certificates: u64,
    pub bookshelves: u64,
    pub libraries: u64,
    pub custom_fields: u64,
    pub deleted_books: u64,
    /// Cover entries written, by name
    pub cover_names: BTreeSet<String>,
}

impl WriteResults {
    /// Entities of `ty` written so far.
    pub fn count(&self, ty: RecordType) -> u64 {
        match ty {
            RecordType::Books => self.books,
            RecordType::Cover => self.covers,
            RecordType::Styles => self.styles,
            RecordType::Preferences => self.preferences,
            RecordType::Certificates => self.certificates,
            RecordType::Bookshelves => self.bookshelves,
            RecordType::Libraries => self.libraries,
            RecordType::CustomFields => self.custom_fields,
            RecordType::DeletedBooks => self.deleted_books,
            RecordType::MetaData | RecordType::Database | RecordType::AutoDetect => 0,
        }
    }

    pub(crate) fn count_mut(&mut self, ty: RecordType) -> Option<&mut u64> {
        match ty {
            RecordType::Books => Some(&mut self.books),
            RecordType::Cover => Some(&mut self.covers),
            RecordType::Styles => Some(&mut self.styles),
            RecordType::Preferences => Some(&mut self.preferences),
            RecordType::Certificates => Some(&mut self.certificates),
            RecordType::Bookshelves => Some(&mut self.bookshelves),
            RecordType::Libraries => Some(&mut self.libraries),
            RecordType::CustomFields => Some(&mut self.custom_fields),
            RecordType::DeletedBooks => Some(&mut self.deleted_books),
            RecordType::MetaData | RecordType::Database | RecordType::AutoDetect => None,
        }
    }
}

impl Add for WriteResults {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for WriteResults {
    fn add_assign(&mut self, rhs: Self) {
        self.books += rhs.books;
        self.covers += rhs.covers;
        self.styles += rhs.styles;
        self.preferences += rhs.preferences;
        self.certificates += rhs.certificates;
        self.bookshelves += rhs.bookshelves;
        self.libraries += rhs.libraries;
        self.custom_fields += rhs.custom_fields;
        self.deleted_books += rhs.deleted_books;
        self.cover_names.extend(rhs.cover_names);
    }
}

impl Sum for WriteResults {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(books: u64, failed: u64, skipped_records: u64) -> ReadResults {
        ReadResults {
            books: Counters { processed: books, created: books - failed, failed, ..Counters::default() },
            records_skipped: skipped_records,
            ..ReadResults::default()
        }
    }

    #[test]
    fn test_merge_is_associative_and_commutative() {
        let (a, b, c) = (sample(3, 1, 0), sample(5, 0, 2), sample(1, 1, 1));
        assert_eq!(a.clone() + b.clone(), b.clone() + a.clone());
        assert_eq!((a.clone() + b.clone()) + c.clone(), a.clone() + (b.clone() + c.clone()));
        let total: ReadResults = [a, b, c].into_iter().sum();
        assert_eq!(total.books.processed, 9);
        assert_eq!(total.failed(), 2);
        assert_eq!(total.records_skipped, 3);
    }

    #[test]
    fn test_write_merge_unions_cover_names() {
        let a = WriteResults { covers: 1, cover_names: BTreeSet::from(["a.jpg".into()]), ..Default::default() };
        let b = WriteResults { covers: 1, cover_names: BTreeSet::from(["b.jpg".into()]), ..Default::default() };
        let total = a + b;
        assert_eq!(total.count(RecordType::Cover), 2);
        assert_eq!(total.cover_names.len(), 2);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = Outcome::Cancelled(sample(2, 0, 0));
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.map(|r| r.books.processed), Outcome::Cancelled(2));
    }
}
