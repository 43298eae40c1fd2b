//! Shared types and error definitions used across the `objwire` server and
//! benchmark client.
//!
//! ## Submodules
//!
//! - [`error`] - Unified error type and its `tonic::Status` mappings.
//! - [`types`] - Protocol constants and identifier helpers.
//! - [`snapshot`] - The immutable object served by every endpoint.
//! - [`session`] - State machine shared by both ends of a streaming session.

pub mod error;
pub mod session;
pub mod snapshot;
pub mod types;

pub use error::{Error, Result};
pub use session::{SessionEvent, SessionPhase, SessionState};
pub use snapshot::ObjectSnapshot;

pub mod proto {
    tonic::include_proto!("objwire");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("objwire_descriptor");
}
