//! Error types for the blog service.
//!
//! This module defines the central `Error` enum, which captures every
//! caller-visible failure of the blog service. It implements
//! `From<Error> for tonic::Status`, the single place where gRPC status codes
//! are chosen.
//!
//! ## Error Cases
//! - `MalformedIdentifier`: A wire identifier was not 24 lowercase hex
//!   characters. Never retried.
//! - `MissingField`: A required request field was absent.
//! - `NotFound`: No document matched the identifier. Absence, not a fault.
//! - `Internal`: The store failed on a write path or while scanning.
//! - `Unavailable`: The store failed on a read path, or a scanned document
//!   could not be decoded.
//! - `RequestCancelled`: The client went away mid-stream.
//! - `ServiceShutdown`: The request arrived while the service was shutting
//!   down.

use crate::IdError;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the blog service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// The identifier could not be decoded.
    #[error("Malformed identifier {id:?}: {source}")]
    MalformedIdentifier {
        id: String,
        #[source]
        source: IdError,
    },

    /// A required request field was not set.
    #[error("Missing field: {field}")]
    MissingField { field: &'static str },

    /// No document matched the identifier.
    #[error("No blog with id {id}")]
    NotFound { id: String },

    /// The store failed on a write or scan path.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The store failed on a read path.
    #[error("Unavailable: {context}")]
    Unavailable { context: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::MalformedIdentifier { id, source } => {
                Status::invalid_argument(format!("Could not convert {id:?} to an object id: {source}"))
            }
            Error::MissingField { field } => {
                Status::invalid_argument(format!("Missing required field `{field}`"))
            }
            Error::NotFound { id } => {
                Status::not_found(format!("Could not find blog with object id {id}"))
            }
            Error::Internal { context } => Status::internal(format!("Internal error: {context}")),
            Error::Unavailable { context } => Status::unavailable(context),
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
