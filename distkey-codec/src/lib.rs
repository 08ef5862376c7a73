//! Tooling for packing and unpacking protocol data from streams.
//!
//! This exposes a standard way of serializing the wire frames and the
//! published protocol state of the other crates in this workspace.

pub mod deser;
pub mod packer;

pub use deser::{Deserialize, ReadError, Serialize, WriteError};
pub use packer::Codec;
