//! gRPC service implementation.
//!
//! This module contains the client-facing `ObjectAccessor` service. Unary
//! calls are answered inline; streaming calls are handed to the session driver
//! in [`crate::server::streaming`].
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`ObjectService`).

pub mod handler;
