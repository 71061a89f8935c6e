//! Logical record kinds and the dependency graph between them.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The logical kind of a record, independent of its serialisation.
///
/// Declaration order matters twice over: [`resolve`](RecordType::resolve)
/// takes the first type whose name prefixes an entry name (so
/// `bookshelves.json` is Bookshelves, not Books, and `database.db` is
/// Database, not AutoDetect), and it is the tie-break when ordering writes.
/// [`Cover`](RecordType::Cover) has an empty prefix and must stay last.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordType {
    #[display("info")]
    MetaData,
    #[display("styles")]
    Styles,
    #[display("preferences")]
    Preferences,
    #[display("certificates")]
    Certificates,
    #[display("bookshelves")]
    Bookshelves,
    #[display("libraries")]
    Libraries,
    #[display("customfields")]
    CustomFields,
    #[display("deletedbooks")]
    DeletedBooks,
    #[display("books")]
    Books,
    #[display("database")]
    Database,
    #[display("data")]
    AutoDetect,
    #[display("cover")]
    Cover,
}

impl RecordType {
    /// Every type, in declaration (and therefore matching) order.
    pub const ALL: [Self; 12] = [
        Self::MetaData,
        Self::Styles,
        Self::Preferences,
        Self::Certificates,
        Self::Bookshelves,
        Self::Libraries,
        Self::CustomFields,
        Self::DeletedBooks,
        Self::Books,
        Self::Database,
        Self::AutoDetect,
        Self::Cover,
    ];

    /// Entry-name prefix written for, and matched against, this type.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::MetaData => "info",
            Self::Styles => "styles",
            Self::Preferences => "preferences",
            Self::Certificates => "certificates",
            Self::Bookshelves => "bookshelves",
            Self::Libraries => "libraries",
            Self::CustomFields => "customfields",
            Self::DeletedBooks => "deletedbooks",
            Self::Books => "books",
            Self::Database => "database",
            Self::AutoDetect => "data",
            Self::Cover => "",
        }
    }

    /// Types that must be present (and written earlier) for this one to be
    /// restorable.
    pub fn implied(self) -> &'static [Self] {
        match self {
            Self::Books => &[Self::Bookshelves, Self::Libraries, Self::DeletedBooks],
            Self::Preferences => &[Self::CustomFields],
            _ => &[],
        }
    }

    /// Resolve the type of an entry from its name.
    ///
    /// Only the last path segment is considered. Returns `None` for names that
    /// cannot be a record at all (empty, or a directory).
    pub fn resolve(entry_name: &str) -> Option<Self> {
        let file_name = entry_name.rsplit(['/', '\\']).next().unwrap_or(entry_name);
        if file_name.is_empty() {
            return None;
        }
        let file_name = file_name.to_lowercase();
        Self::ALL.into_iter().find(|ty| file_name.starts_with(ty.prefix()))
    }

    /// Add everything the requested types imply, transitively.
    ///
    /// Returns a new set; the input is left alone. `expand(expand(s))` equals
    /// `expand(s)`.
    pub fn expand(requested: &BTreeSet<Self>) -> BTreeSet<Self> {
        let mut expanded = requested.clone();
        let mut pending: Vec<Self> = requested.iter().copied().collect();
        while let Some(ty) = pending.pop() {
            for &implied in ty.implied() {
                if expanded.insert(implied) {
                    pending.push(implied);
                }
            }
        }
        expanded
    }

    /// Order `types` for writing: every type comes after the types it
    /// depends on, ties broken by declaration order. MetaData is never part
    /// of the result; the container writes it itself.
    pub fn write_order(types: &BTreeSet<Self>) -> Vec<Self> {
        fn visit(ty: RecordType, types: &BTreeSet<RecordType>, order: &mut Vec<RecordType>) {
            if order.contains(&ty) {
                return;
            }
            for &dependency in ty.implied() {
                if types.contains(&dependency) {
                    visit(dependency, types, order);
                }
            }
            order.push(ty);
        }

        let mut order = Vec::with_capacity(types.len());
        for &ty in types.iter().filter(|&&ty| ty != Self::MetaData) {
            visit(ty, types, &mut order);
        }
        order
    }
}
