//! The fail-closed resolution pipeline.
//!
//! merge, substitute, linearize, emit. Any conflict or violation stops the
//! run before a plan or contract exists.

use std::collections::BTreeMap;

use serde::Serialize;
use vresolve_common::config::ResolverConfig;
use vresolve_common::error::VresolveError;
use vresolve_common::types::CopyPolicy;
use vresolve_recipe::Step;
use vresolve_recipe::digest::DigestIndex;
use vresolve_recipe::loader::Definitions;

use crate::args;
use crate::emit::{self, EmitOptions, RuntimeContract};
use crate::error::ResolveError;
use crate::linearize::{self, Advisory, ResolvedPlan};
use crate::merger::{self, MergeOutcome};

/// A successful resolution: the plan and the contract derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The linearized plan.
    pub plan: ResolvedPlan,
    /// The runtime contract.
    pub contract: RuntimeContract,
}

/// Machine-readable document printed on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDocument {
    /// Environment, ports and entrypoint.
    pub contract: RuntimeContract,
    /// Steps in build order.
    pub steps: Vec<Step>,
    /// Non-fatal notes.
    pub advisories: Vec<Advisory>,
}

impl Resolution {
    /// Builds the output document.
    #[must_use]
    pub fn document(&self) -> OutputDocument {
        OutputDocument {
            contract: self.contract.clone(),
            steps: self.plan.steps.clone(),
            advisories: self.plan.advisories.clone(),
        }
    }
}

/// Runs resolutions under one configuration.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Hashes COPY sources when the content-hash policy is active; otherwise
    /// returns an empty index.
    ///
    /// # Errors
    ///
    /// Returns an error if the content-hash policy has no context directory
    /// or a source file cannot be read.
    pub fn digests(&self, definitions: &Definitions) -> vresolve_common::error::Result<DigestIndex> {
        if self.config.copy_policy == CopyPolicy::Strict {
            return Ok(DigestIndex::default());
        }
        let context = self
            .config
            .context_dir
            .as_deref()
            .ok_or_else(|| VresolveError::Config {
                message: "copy policy content-hash requires a context directory".into(),
            })?;
        DigestIndex::build(context, definitions.all_steps())
    }

    /// Merges the base with every overlay. Never fails; conflicts are
    /// returned in the outcome.
    #[must_use]
    pub fn merge(&self, definitions: &Definitions, digests: &DigestIndex) -> MergeOutcome {
        merger::merge_with(definitions.base.steps(), &definitions.overlays, digests)
    }

    /// Resolves the definitions into a plan and runtime contract.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Conflicts`] with every conflict if the merge
    /// found any, or the first argument, dependency or port error.
    pub fn resolve(
        &self,
        definitions: &Definitions,
        build_args: &BTreeMap<String, String>,
    ) -> Result<Resolution, ResolveError> {
        let digests = self.digests(definitions)?;
        let outcome = self.merge(definitions, &digests);
        if !outcome.conflicts.is_empty() {
            return Err(ResolveError::Conflicts(outcome.conflicts));
        }
        tracing::info!(
            steps = outcome.steps.len(),
            env_overrides = merger::override_count(&outcome.steps),
            "overlays merged"
        );

        let defaults = args::declared_defaults(&outcome.steps);
        let substituted = args::resolve(&outcome.steps, build_args, &defaults)?;
        let plan = linearize::linearize(substituted)?;
        let options = EmitOptions {
            absolute_path_vars: self.config.absolute_path_vars.clone(),
        };
        let contract = emit::emit(&plan, &options)?;
        Ok(Resolution { plan, contract })
    }
}
