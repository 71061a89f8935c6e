use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How an imported entity that collides with an existing one is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePolicy {
    /// Keep the existing entity.
    Skip,
    /// Replace the existing entity unconditionally.
    Overwrite,
    /// Replace the existing entity only if the incoming one is strictly newer.
    #[default]
    OnlyNewer,
}

/// What to do with one incoming entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Create,
    Update,
    Skip,
}

impl UpdatePolicy {
    /// Resolve one incoming entity.
    ///
    /// `existing` is `None` when nothing collides, otherwise the existing
    /// entity's last-modified time (which may itself be unknown).
    ///
    /// Under `OnlyNewer` an incoming entity without a timestamp is never
    /// newer and is skipped, while one with a timestamp replaces an existing
    /// entity that has none.
    pub fn resolve(self, existing: Option<Option<OffsetDateTime>>, incoming: Option<OffsetDateTime>) -> Resolution {
        let Some(existing) = existing else {
            return Resolution::Create;
        };
        match self {
            Self::Skip => Resolution::Skip,
            Self::Overwrite => Resolution::Update,
            Self::OnlyNewer => match (existing, incoming) {
                (_, None) => Resolution::Skip,
                (None, Some(_)) => Resolution::Update,
                (Some(existing), Some(incoming)) if incoming > existing => Resolution::Update,
                (Some(_), Some(_)) => Resolution::Skip,
            },
        }
    }
}
