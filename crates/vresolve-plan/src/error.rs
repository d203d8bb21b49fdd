//! Resolution errors.
//!
//! Every variant is a deterministic structural problem in the inputs; none
//! is retried. Conflicts are reported as a whole, never one at a time.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use vresolve_common::error::VresolveError;
use vresolve_recipe::{Origin, StepKind};

/// One side of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contender {
    /// Where the step was declared.
    pub origin: Origin,
    /// Its source text.
    pub source: Option<String>,
}

/// Two steps sharing a `(kind, target)` key with incompatible values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictEntry {
    /// Kind of both steps.
    pub kind: StepKind,
    /// Shared target.
    pub target: String,
    /// The step already in the merged plan.
    pub existing: Contender,
    /// The step that was refused.
    pub incoming: Contender,
}

impl fmt::Display for ConflictEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} has {:?}, {} has {:?}",
            self.kind,
            self.target,
            self.existing.origin,
            self.existing.source.as_deref().unwrap_or_default(),
            self.incoming.origin,
            self.incoming.source.as_deref().unwrap_or_default(),
        )
    }
}

/// Every conflict found in one merge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConflictReport(Vec<ConflictEntry>);

impl ConflictReport {
    /// Records a conflict.
    pub fn push(&mut self, entry: ConflictEntry) {
        self.0.push(entry);
    }

    /// Whether no conflict was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of conflicts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the conflicts in discovery order.
    #[must_use]
    pub fn entries(&self) -> &[ConflictEntry] {
        &self.0
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "  {entry}")?;
        }
        Ok(())
    }
}

fn list_origins(origins: &[Origin]) -> String {
    if origins.is_empty() {
        return "no origin".into();
    }
    origins
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error returned by the resolution pipeline.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Overlays disagree on one or more `(kind, target)` keys.
    #[error("{count} unresolved merge conflict(s):\n{report}", count = .0.len(), report = .0)]
    Conflicts(ConflictReport),

    /// A `${NAME}` placeholder has no build argument, default, or ENV value.
    #[error("unresolved argument \"{name}\" in {kind} at {origin}")]
    UnresolvedArgument {
        /// Placeholder name, or the malformed placeholder text.
        name: String,
        /// Kind of the step that references it.
        kind: StepKind,
        /// Where that step was declared.
        origin: Origin,
    },

    /// A substitution value would itself introduce a placeholder.
    #[error("value of argument \"{name}\" contains placeholder syntax: {value:?}")]
    NestedPlaceholder {
        /// Argument name.
        name: String,
        /// Offending value.
        value: String,
    },

    /// A plan-wide invariant does not hold after merging.
    #[error("{invariant} ({})", list_origins(.origins))]
    DependencyViolation {
        /// What went wrong.
        invariant: String,
        /// Every step involved.
        origins: Vec<Origin>,
    },

    /// An EXPOSE value is not a valid port after substitution.
    #[error("EXPOSE value {value:?} at {origin} is not a port in 1..=65535")]
    InvalidPort {
        /// Substituted value.
        value: String,
        /// Where the EXPOSE was declared.
        origin: Origin,
    },

    /// Loading or parsing a definition failed.
    #[error(transparent)]
    Recipe(#[from] VresolveError),
}

impl ResolveError {
    /// Process exit code for this error: 1 for conflicts, 2 otherwise.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Conflicts(_) => 1,
            _ => 2,
        }
    }
}
