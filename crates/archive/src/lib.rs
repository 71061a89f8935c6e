//! Backup and restore of a tome catalog.
//!
//! A [`WriterSession`] exports catalog entities into a container (a zip
//! bundle or a single JSON document). A [`ReaderSession`] imports them back
//! from any supported container, including read-only legacy CSV exports and
//! calibre-style library databases. Both run on the caller's worker thread;
//! [`restore`] and [`backup`] wrap them as async streams.

mod cancel;
pub mod codec;
mod consts;
pub mod container;
mod encoding;
pub mod error;
mod format;
pub mod metadata;
mod options;
mod policy;
mod progress;
mod record;
mod results;
mod session;

pub use crate::cancel::CancellationToken;
pub use crate::codec::CodecRegistry;
pub use crate::encoding::RecordEncoding;
pub use crate::format::ContainerFormat;
pub use crate::metadata::{AppInfo, MetaData, Scalar};
pub use crate::options::{EXPORTABLE_TYPES, ExportOptions, ImportOptions};
pub use crate::policy::{Resolution, UpdatePolicy};
pub use crate::progress::{NoProgress, Progress, ProgressListener};
pub use crate::record::RecordType;
pub use crate::results::{Counters, Outcome, ReadResults, WriteResults};
pub use crate::session::{Event, ReaderSession, WriterSession, backup, restore};
