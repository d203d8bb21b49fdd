//! # vresolve-recipe
//!
//! Build recipe definitions for the vresolve resolver.
//!
//! Handles:
//! - **Step**: The build step value type and its merge predicate.
//! - **Parser**: Lexing, parsing, and validation of line-oriented recipes.
//! - **Loader**: Reading base and overlay definitions from disk.
//! - **Digest**: SHA-256 content identity for COPY sources.
//! - **Presets**: Built-in OPTIMADE server deployment variants.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod digest;
pub mod loader;
pub mod parser;
pub mod presets;
pub mod step;

pub use step::{Origin, Overlay, Relation, Step, StepKey, StepKind};
