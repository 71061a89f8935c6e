mod asset;
mod book;
mod shelf;
mod style;

pub use self::asset::{Certificate, Cover};
pub use self::book::{Book, DeletedBook};
pub use self::shelf::{Bookshelf, CustomField, FieldKind, Library};
pub use self::style::{PreferenceValue, Preferences, Style};
