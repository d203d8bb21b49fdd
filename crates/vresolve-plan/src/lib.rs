//! # vresolve-plan
//!
//! Turns a base definition and its variant overlays into one deterministic
//! build plan and runtime contract.
//!
//! Handles:
//! - **Merger**: Layering overlays over the base, collecting every conflict.
//! - **Args**: `${NAME}` substitution from build arguments and defaults.
//! - **Linearize**: Ordering, deduplication, and single-cardinality checks.
//! - **Emit**: The environment, port, and entrypoint contract.
//! - **Render**: The reconciled Dockerfile text.
//! - **Pipeline**: The fail-closed `resolve` entry point.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod args;
pub mod emit;
pub mod error;
pub mod linearize;
pub mod merger;
pub mod pipeline;
pub mod render;

pub use error::{ConflictEntry, ConflictReport, ResolveError};
pub use pipeline::{Resolution, Resolver};
