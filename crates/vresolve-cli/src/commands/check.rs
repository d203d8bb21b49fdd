//! `vresolve check` — Merge definitions and report conflicts.

use clap::Args;
use vresolve_plan::{ResolveError, Resolver};
use vresolve_recipe::Overlay;

use super::InputArgs;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Definition inputs.
    #[command(flatten)]
    pub input: InputArgs,
}

/// Executes the `check` command.
///
/// Loads and merges without substituting arguments. Every conflict is
/// returned at once so one edit can fix them all.
///
/// # Errors
///
/// Returns [`ResolveError::Conflicts`] if the merge found any conflict,
/// or an error if a definition cannot be loaded.
pub fn execute(args: &CheckArgs) -> anyhow::Result<()> {
    let definitions = args.input.definitions()?;
    let resolver = Resolver::new(args.input.resolver_config()?);
    let digests = resolver.digests(&definitions)?;
    let outcome = resolver.merge(&definitions, &digests);
    if !outcome.conflicts.is_empty() {
        tracing::info!(conflicts = outcome.conflicts.len(), "check found conflicts");
        return Err(ResolveError::Conflicts(outcome.conflicts).into());
    }

    let names: Vec<&str> = std::iter::once(definitions.base.name())
        .chain(definitions.overlays.iter().map(Overlay::name))
        .collect();
    println!(
        "ok: {} step(s) merged from {}",
        outcome.steps.len(),
        names.join(", ")
    );
    Ok(())
}
