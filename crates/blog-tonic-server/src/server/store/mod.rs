//! Persistence adapter for blog posts.
//!
//! [`BlogStore`] is the seam between the gRPC handlers and the document
//! store. It exposes the five primitives the service needs and reports
//! failures as a [`StoreError`] instead of a backend-specific error, leaving
//! the choice of gRPC status to the caller (the same failure maps to a
//! different status on a read path than on a write path).
//!
//! ## Implementations
//!
//! - [`mongo::MongoStore`] - MongoDB collection, used by the server binary.
//! - `memory::MemoryStore` - In-process store with failure injection, used by
//!   tests.

use blog_tonic_core::{BlogFields, BlogId, BlogItem, Error};
use futures::stream::BoxStream;

#[cfg(test)]
pub mod memory;
pub mod mongo;

/// Lazy, forward-only sequence over every stored post.
///
/// Items are pulled from the underlying cursor on demand; dropping the stream
/// closes the cursor.
pub type BlogScan = BoxStream<'static, Result<BlogItem, StoreError>>;

/// Tagged failure reasons returned by a [`BlogStore`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No document matched the identifier.
    #[error("no matching document")]
    NotFound,

    /// The backend failed (I/O, server selection, command error, ...).
    #[error("store unavailable: {context}")]
    Unavailable { context: String },

    /// A stored document could not be decoded into a [`BlogItem`].
    #[error("could not decode document: {context}")]
    Decode { context: String },
}

/// The five persistence primitives used by the blog service.
///
/// Implementations must be safe to share across concurrently running
/// handlers; the service imposes no locking of its own.
#[tonic::async_trait]
pub trait BlogStore: Send + Sync + 'static {
    /// Persists an unassigned post and returns the store-assigned identifier.
    async fn insert(&self, item: BlogItem) -> Result<BlogId, StoreError>;

    async fn find_by_id(&self, id: BlogId) -> Result<BlogItem, StoreError>;

    /// Replaces the author, title and content of a post and returns the
    /// post as it is after the update. The identifier is never touched.
    async fn update_by_id(&self, id: BlogId, fields: BlogFields) -> Result<BlogItem, StoreError>;

    /// Fails with [`StoreError::NotFound`] when nothing was deleted.
    async fn delete_by_id(&self, id: BlogId) -> Result<(), StoreError>;

    /// Opens a cursor over the whole collection.
    async fn scan_all(&self) -> Result<BlogScan, StoreError>;

    /// Releases the underlying connection.
    async fn close(&self);
}

impl StoreError {
    /// Maps a failure on a read path (`ReadBlog`).
    pub fn on_read(self, id: BlogId) -> Error {
        match self {
            Self::NotFound => Error::NotFound { id: id.encode() },
            Self::Unavailable { context } | Self::Decode { context } => {
                Error::Unavailable { context }
            }
        }
    }

    /// Maps a failure on a write path (`CreateBlog`, `UpdateBlog`,
    /// `DeleteBlog`).
    pub fn on_write(self, id: Option<BlogId>) -> Error {
        match (self, id) {
            (Self::NotFound, Some(id)) => Error::NotFound { id: id.encode() },
            (Self::NotFound, None) => Error::Internal {
                context: "store reported a missing document on insert".to_string(),
            },
            (Self::Unavailable { context } | Self::Decode { context }, _) => {
                Error::Internal { context }
            }
        }
    }

    /// Maps a failure while opening or draining a `ListBlogs` scan.
    ///
    /// Cursor failures are internal; a document that cannot be decoded
    /// surfaces as unavailable.
    pub fn on_scan(self) -> Error {
        match self {
            Self::Decode { context } => Error::Unavailable {
                context: format!("Could not decode data: {context}"),
            },
            Self::Unavailable { context } => Error::Internal {
                context: format!("Unknown cursor error: {context}"),
            },
            Self::NotFound => Error::Internal {
                context: "cursor reported a missing document".to_string(),
            },
        }
    }
}
