//! `vresolve resolve` — Resolve definitions into a runtime contract.

use clap::Args;
use vresolve_common::types::OutputFormat;
use vresolve_plan::Resolver;

use super::InputArgs;
use crate::output;

/// Arguments for the `resolve` command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Definition inputs.
    #[command(flatten)]
    pub input: InputArgs,

    /// Output document format. Overrides the config file.
    #[arg(long, env = "VRESOLVE_FORMAT", value_name = "json|yaml")]
    pub format: Option<OutputFormat>,
}

/// Executes the `resolve` command.
///
/// Merges the overlays over the base, substitutes build arguments,
/// linearizes the plan and prints the contract, steps and advisories.
///
/// # Errors
///
/// Returns an error if loading fails, any conflict is found, or an
/// argument or dependency check fails.
pub fn execute(args: &ResolveArgs) -> anyhow::Result<()> {
    let mut config = args.input.resolver_config()?;
    if let Some(format) = args.format {
        config.output_format = format;
    }
    let definitions = args.input.definitions()?;
    let resolver = Resolver::new(config);
    let resolution = resolver.resolve(&definitions, &args.input.build_args())?;
    tracing::info!(
        overlays = definitions.overlays.len(),
        steps = resolution.plan.steps.len(),
        format = %resolver.config().output_format,
        "resolution succeeded"
    );
    output::print_document(&resolution.document(), resolver.config().output_format)
}
