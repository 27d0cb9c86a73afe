//! gRPC service and message definitions generated from `proto/blog.proto`.
//!
//! ## Service
//!
//! - `BlogService` - CRUD over blog posts plus a server-streaming
//!   `ListBlogs` enumeration.
//!
//! ## Messages
//!
//! - [`Blog`] - A blog post. `id` is empty until the post is persisted.
//! - `*Req` / `*Res` - Per-RPC request and response envelopes.

tonic::include_proto!("blog");

/// Encoded `FileDescriptorSet` for `blog.proto`, registered with the gRPC
/// reflection service.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("blog_descriptor");
