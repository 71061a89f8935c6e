use time::OffsetDateTime;

/// A trusted server certificate, PEM encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Certificate {
    pub name: String,
    pub pem: String,
}

/// A cover image. The name doubles as the archive entry name.
#[derive(Clone, PartialEq, Eq)]
pub struct Cover {
    pub name: String,
    pub bytes: Vec<u8>,
    pub modified: Option<OffsetDateTime>,
}

impl Cover {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into(), modified: None }
    }
}

impl std::fmt::Debug for Cover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cover")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("modified", &self.modified)
            .finish()
    }
}
