//! Shared protocol types for the blog service.
//!
//! - [`proto`] - Generated protobuf messages and gRPC service bindings.
//! - [`id`] - [`BlogId`], the wire/storage identifier codec.
//! - [`blog`] - [`BlogItem`] and [`BlogFields`], the storage-side entity and
//!   its mapping to and from the wire [`proto::Blog`].
//! - [`error`] - The service [`Error`] and its `tonic::Status` mapping.

pub mod blog;
pub mod error;
pub mod id;
pub mod proto;

pub use blog::{BlogFields, BlogItem};
pub use error::{Error, Result};
pub use id::{BlogId, IdError};
