//! # Protocol Constants
//!
//! Values both ends of the wire agree on: the fixed media type, the path of
//! the plain fetch endpoint, and the identifier the benchmark client sends.
//!
//! Only one object exists, so an [`ObjectIdentifier`] is accepted but never
//! used for routing. Any identifier resolves to the served snapshot.

use crate::proto::ObjectIdentifier;

/// Media type attached to every response, on every transport.
pub const MEDIA_TYPE: &str = "application/octet-stream";

/// Path of the plain HTTP fetch endpoint.
pub const HTTP_OBJECT_PATH: &str = "/http";

/// Default size limit for encoded and decoded gRPC messages (64 MiB).
///
/// The whole object travels in one message, so tonic's 4 MiB default is too
/// small for realistic payloads.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

impl ObjectIdentifier {
    pub fn new(
        namespace: impl Into<String>,
        scope: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// The identifier the benchmark client requests.
    pub fn benchmark() -> Self {
        Self::new("test", "manual", "dummy")
    }
}
