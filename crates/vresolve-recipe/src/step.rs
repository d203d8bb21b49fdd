//! Build steps and the overlays that carry them.
//!
//! A [`Step`] is a pure value. Whether two steps can coexist in one plan is
//! decided by [`Step::relation`], which every later phase relies on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::DigestIndex;

/// Kind of a build instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepKind {
    /// `FROM image`: base image, at most one per plan.
    From,
    /// `COPY src dest`.
    Copy,
    /// `RUN command`.
    Run,
    /// `ENV NAME value`.
    Env,
    /// `ARG NAME[=default]`.
    Arg,
    /// `WORKDIR path`.
    Workdir,
    /// `EXPOSE port`.
    Expose,
    /// `ENTRYPOINT path`: exactly one per plan.
    Entrypoint,
}

impl StepKind {
    /// Parses an instruction keyword, ignoring ASCII case.
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "FROM" => Self::From,
            "COPY" => Self::Copy,
            "RUN" => Self::Run,
            "ENV" => Self::Env,
            "ARG" => Self::Arg,
            "WORKDIR" => Self::Workdir,
            "EXPOSE" => Self::Expose,
            "ENTRYPOINT" => Self::Entrypoint,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the canonical upper-case keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::From => "FROM",
            Self::Copy => "COPY",
            Self::Run => "RUN",
            Self::Env => "ENV",
            Self::Arg => "ARG",
            Self::Workdir => "WORKDIR",
            Self::Expose => "EXPOSE",
            Self::Entrypoint => "ENTRYPOINT",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Where a step was declared: definition name and 1-based line.
///
/// Ordered by definition name, then line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// Name of the base or overlay definition.
    pub definition: String,
    /// Line the instruction starts on.
    pub line: usize,
}

impl Origin {
    /// Creates an origin.
    pub fn new(definition: impl Into<String>, line: usize) -> Self {
        Self {
            definition: definition.into(),
            line,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.definition, self.line)
    }
}

/// Key under which steps are deduplicated and checked for conflicts.
pub type StepKey = (StepKind, String);

/// One build action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Instruction kind.
    pub kind: StepKind,
    /// Destination path, variable name, port, or command text.
    pub target: String,
    /// Origin path, command text, or value. `None` only for an ARG without default.
    pub source: Option<String>,
    /// Definition that contributed this step.
    pub origin: Origin,
}

/// How two steps relate when they meet during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Different keys; both belong in the plan.
    Distinct,
    /// Same key and compatible value; the later one is dropped.
    Mergeable,
    /// Same ENV name with a new value; both are kept, the later one wins.
    Override,
    /// Same key, incompatible values.
    Conflict,
}

impl Step {
    /// Creates a step with a source value.
    pub fn new(
        kind: StepKind,
        target: impl Into<String>,
        source: impl Into<String>,
        origin: Origin,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            source: Some(source.into()),
            origin,
        }
    }

    /// Creates an `ARG` step without a default.
    pub fn bare_arg(name: impl Into<String>, origin: Origin) -> Self {
        Self {
            kind: StepKind::Arg,
            target: name.into(),
            source: None,
            origin,
        }
    }

    /// Returns the deduplication key.
    #[must_use]
    pub fn key(&self) -> StepKey {
        (self.kind, self.target.clone())
    }

    /// Returns the source text, or `""` for an ARG without default.
    #[must_use]
    pub fn source_text(&self) -> &str {
        self.source.as_deref().unwrap_or_default()
    }

    /// Classifies how `other` relates to `self` under the strict COPY policy.
    #[must_use]
    pub fn relation(&self, other: &Self) -> Relation {
        self.relation_with(other, &DigestIndex::default())
    }

    /// Classifies how `other` relates to `self`, letting COPY sources with
    /// identical recorded content digests merge.
    #[must_use]
    pub fn relation_with(&self, other: &Self, digests: &DigestIndex) -> Relation {
        if self.kind != other.kind || self.target != other.target {
            return Relation::Distinct;
        }
        if self.source == other.source {
            return Relation::Mergeable;
        }
        match self.kind {
            StepKind::Env => Relation::Override,
            StepKind::Arg if self.source.is_none() || other.source.is_none() => {
                Relation::Mergeable
            }
            StepKind::Copy if digests.same_content(self.source_text(), other.source_text()) => {
                Relation::Mergeable
            }
            _ => Relation::Conflict,
        }
    }

    /// Renders the step as a recipe instruction that parses back to the
    /// same kind, target and source.
    ///
    /// COPY falls back to the exec form when a path holds whitespace or
    /// quotes.
    #[must_use]
    pub fn to_instruction(&self) -> String {
        match (self.kind, &self.source) {
            (StepKind::Copy, Some(src)) if needs_exec_form(src, &self.target) => {
                format!("COPY [{}, {}]", json_string(src), json_string(&self.target))
            }
            (StepKind::Copy, Some(src)) => format!("COPY {src} {}", self.target),
            (StepKind::Env, Some(value)) => format!("ENV {}={}", self.target, quote(value)),
            (StepKind::Arg, Some(default)) => format!("ARG {}={}", self.target, quote(default)),
            (StepKind::Arg, None) => format!("ARG {}", self.target),
            (StepKind::Entrypoint, _) => format!("ENTRYPOINT [{}]", json_string(&self.target)),
            (StepKind::From | StepKind::Workdir, _) => {
                format!("{} {}", self.kind, quote(&self.target))
            }
            (kind, _) => format!("{kind} {}", self.target),
        }
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty() || value.contains(char::is_whitespace) || value.contains('"')
}

fn needs_exec_form(src: &str, dest: &str) -> bool {
    needs_quoting(src) || needs_quoting(dest) || src.starts_with('[')
}

fn quote(value: &str) -> String {
    if !needs_quoting(value) {
        return value.to_owned();
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// A named, ordered sequence of steps for one deployment variant.
///
/// Overlays are immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    name: String,
    steps: Vec<Step>,
}

impl Overlay {
    /// Creates an overlay from already-parsed steps.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Parses an overlay from recipe text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text contains syntax errors or fails validation.
    pub fn parse(name: impl Into<String>, input: &str) -> vresolve_common::error::Result<Self> {
        let name = name.into();
        let steps = crate::parser::parse_recipe(&name, input)?;
        Ok(Self { name, steps })
    }

    /// Returns the overlay name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
