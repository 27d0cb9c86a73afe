//! gRPC service implementation for blog posts.
//!
//! This module contains the client-facing request handling: identifier
//! validation, translation between wire and storage forms, status mapping,
//! and shutdown coordination. Persistence is delegated to a
//! [`BlogStore`](crate::server::store::BlogStore).
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`BlogServiceImpl`).

pub mod handler;
