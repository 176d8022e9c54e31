//! Zip container codec.
//!
//! [`ContainerHandle`] reads entries out of an in-memory container and
//! [`ContainerWriter`] assembles one. Neither knows anything about manifests.

mod handle;
mod writer;

pub use handle::{ContainerHandle, EntryDescriptor};
pub use writer::ContainerWriter;
