pub mod error;
mod location;
pub mod resource;

pub use crate::location::Location;
pub use crate::location::validate as validate_path;
pub use crate::resource::{BoxReader, BoxWriter, LocalResource, ReadSeek, Resource, ResourceHandle, WriteSeek};
#[cfg(any(test, feature = "mock"))]
pub use crate::resource::MemoryResource;
