//! Core types for the gapic RPC client runtime.
//!
//! This crate provides the protocol-independent building blocks shared by the
//! runtime crates:
//!
//! - [`error`]: canonical status codes and the [`Status`] type
//! - [`envelope`]: length-prefixed framing for streamed response bodies
//! - [`path`]: resource-name templates for rendering and parsing hierarchical ids

mod envelope;
mod error;
mod path;

pub use envelope::*;
pub use error::*;
pub use path::*;
