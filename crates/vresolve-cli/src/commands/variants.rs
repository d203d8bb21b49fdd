//! `vresolve variants` — List the built-in definitions.

use clap::Args;
use vresolve_recipe::presets::PRESETS;

/// Arguments for the `variants` command.
#[derive(Args, Debug)]
pub struct VariantsArgs {
    /// Print the recipe text of this preset instead of the list.
    #[arg(long, value_name = "NAME")]
    pub show: Option<String>,
}

/// Executes the `variants` command.
///
/// # Errors
///
/// Returns an error if `--show` names an unknown preset.
pub fn execute(args: &VariantsArgs) -> anyhow::Result<()> {
    if let Some(name) = &args.show {
        let preset = vresolve_recipe::presets::find(name)
            .ok_or_else(|| anyhow::anyhow!("unknown preset \"{name}\""))?;
        print!("{}", preset.text);
        return Ok(());
    }

    tracing::debug!(presets = PRESETS.len(), "listing presets");
    println!("NAME\tDESCRIPTION");
    for preset in PRESETS {
        println!("{}\t{}", preset.name, preset.description);
    }
    Ok(())
}
