//! Server-streaming support for `ListBlogs`.
//!
//! - [`feed`] - Pulls documents off a store scan and forwards them, one
//!   message per post, onto the bounded response channel backing the gRPC
//!   stream.

pub mod feed;
