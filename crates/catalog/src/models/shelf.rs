/// A named, user-defined grouping of books.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Bookshelf {
    /// Unique, and the identity books refer to
    pub name: String,
    /// Display style uuid
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub style: Option<String>,
}

impl Bookshelf {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), style: None }
    }
}

/// An external library that books are synchronised with.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Library {
    pub uuid: String,
    pub name: String,
    /// Bookshelf that books imported from this library are mapped onto
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub bookshelf: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Boolean,
    Date,
}

/// A user-defined book field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct CustomField {
    pub key: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: FieldKind,
    pub label: String,
}
