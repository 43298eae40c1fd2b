//! Server side of the streaming delivery protocol.
//!
//! - [`session`] - Per-call session driver pairing every inbound identifier
//!   with exactly one outbound response.

pub mod session;
