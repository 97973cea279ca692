//! Character animation runtime: clip scheduling with crossfades and listener events,
//! skeletal pose evaluation over a push/pop bone hierarchy, and frame-gated transition graphs.
//!
//! The crate is renderer-agnostic and IO-free. Evaluated channel values are handed to an
//! [`AnimationTarget`], bone transforms are returned as `glam` matrices.

#![forbid(unsafe_code)]

mod error;
mod model;
mod runtime;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "binary")]
pub mod binary;

pub use error::*;
pub use model::*;
pub use runtime::*;
