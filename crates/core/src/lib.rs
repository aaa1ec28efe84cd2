// crates/core/src/lib.rs
//! Stevedore core library.
//!
//! Configuration, the external archiver collaborator, and temp-artifact
//! path helpers. No HTTP and no shared mutable state live here; the server
//! crate layers those on top.

pub mod archiver;
pub mod artifact;
pub mod config;
pub mod error;

pub use archiver::*;
pub use artifact::*;
pub use config::*;
pub use error::*;
