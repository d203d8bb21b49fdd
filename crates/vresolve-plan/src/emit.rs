//! Runtime contract emission.
//!
//! The contract is what the container entrypoint script relies on: the final
//! environment, the exposed ports and the absolute entrypoint path.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use vresolve_common::constants::DEFAULT_ABSOLUTE_PATH_VARS;
use vresolve_recipe::{Origin, Step, StepKind};

use crate::error::ResolveError;
use crate::linearize::ResolvedPlan;

/// Environment, ports and entrypoint handed to the running container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeContract {
    /// Final environment variables.
    pub env: BTreeMap<String, String>,
    /// Exposed ports.
    pub exposed_ports: BTreeSet<u16>,
    /// Absolute path of the process entry point.
    pub entrypoint: String,
}

/// Checks applied while emitting a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    /// Variables that must hold absolute paths when set.
    pub absolute_path_vars: Vec<String>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            absolute_path_vars: DEFAULT_ABSOLUTE_PATH_VARS
                .iter()
                .map(|v| (*v).to_owned())
                .collect(),
        }
    }
}

/// Folds ENV steps in order; a later assignment replaces an earlier one.
#[must_use]
pub fn fold_env(steps: &[Step]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for step in steps.iter().filter(|s| s.kind == StepKind::Env) {
        let _ = env.insert(step.target.clone(), step.source_text().to_owned());
    }
    env
}

fn last_env_origin(steps: &[Step], name: &str) -> Vec<Origin> {
    steps
        .iter()
        .rev()
        .find(|s| s.kind == StepKind::Env && s.target == name)
        .map(|s| vec![s.origin.clone()])
        .unwrap_or_default()
}

fn entrypoint_path(plan: &ResolvedPlan) -> Result<String, ResolveError> {
    let path = plan.entrypoint.target.as_str();
    if path.starts_with('/') {
        return Ok(path.to_owned());
    }
    let Some(workdir) = plan.workdir.as_deref().filter(|w| w.starts_with('/')) else {
        return Err(ResolveError::DependencyViolation {
            invariant: format!("ENTRYPOINT {path} is relative and no absolute WORKDIR is set"),
            origins: vec![plan.entrypoint.origin.clone()],
        });
    };
    let relative = path.trim_start_matches("./");
    Ok(format!("{}/{relative}", workdir.trim_end_matches('/')))
}

/// Builds the runtime contract for a resolved plan.
///
/// # Errors
///
/// Returns [`ResolveError::DependencyViolation`] if a variable listed in
/// `options.absolute_path_vars` holds a relative path, or if the
/// entrypoint is relative with no absolute WORKDIR to anchor it.
pub fn emit(plan: &ResolvedPlan, options: &EmitOptions) -> Result<RuntimeContract, ResolveError> {
    for name in &options.absolute_path_vars {
        let Some(value) = plan.env.get(name) else {
            continue;
        };
        if !value.starts_with('/') {
            return Err(ResolveError::DependencyViolation {
                invariant: format!("{name} must be an absolute path, got {value:?}"),
                origins: last_env_origin(&plan.steps, name),
            });
        }
    }

    let entrypoint = entrypoint_path(plan)?;
    tracing::info!(
        env = plan.env.len(),
        ports = plan.exposed_ports.len(),
        entrypoint = %entrypoint,
        "runtime contract emitted"
    );
    Ok(RuntimeContract {
        env: plan.env.clone(),
        exposed_ports: plan.exposed_ports.clone(),
        entrypoint,
    })
}
