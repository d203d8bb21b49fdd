//! `vresolve render` — Print the reconciled recipe.

use clap::Args;
use vresolve_plan::Resolver;

use super::InputArgs;

/// Arguments for the `render` command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Definition inputs.
    #[command(flatten)]
    pub input: InputArgs,
}

/// Executes the `render` command.
///
/// # Errors
///
/// Returns an error under the same conditions as `resolve`.
pub fn execute(args: &RenderArgs) -> anyhow::Result<()> {
    let definitions = args.input.definitions()?;
    let resolution = Resolver::new(args.input.resolver_config()?)
        .resolve(&definitions, &args.input.build_args())?;
    print!("{}", vresolve_plan::render::render(&resolution.plan));
    Ok(())
}
