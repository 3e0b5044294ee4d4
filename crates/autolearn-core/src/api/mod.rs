//! REST API access for the training portal.
//!
//! This module provides the `ApiClient` for issuing requests with retry and
//! transport fallback, the `Outcome` every call resolves to, and the
//! `Paginator` for list endpoints.
//!
//! The portal authenticates with a token returned by `auth/login`, sent back
//! verbatim in the `Authorization` header.

pub mod client;
pub mod error;
pub mod outcome;
pub mod pagination;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, ApiRequest};
pub use error::TransportError;
pub use outcome::Outcome;
pub use pagination::{PageSet, Paginator};
pub use transport::{NativeTransport, StreamTransport, Transport, TransportRequest, TransportResponse};
