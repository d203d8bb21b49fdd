//! CLI command definitions and dispatch.

pub mod check;
pub mod render;
pub mod resolve;
pub mod variants;

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vresolve_common::config::ResolverConfig;
use vresolve_common::constants::CONFIG_PATH_ENV;
use vresolve_common::types::CopyPolicy;
use vresolve_plan::args::{BuildArg, collect_build_args};
use vresolve_recipe::loader::{Definitions, OverlaySpec};

/// vresolve — variant-aware deployment recipe resolver.
#[derive(Parser, Debug)]
#[command(name = "vresolve", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log line format on stderr. `RUST_LOG` sets the filter.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve definitions and print the runtime contract and plan.
    Resolve(resolve::ResolveArgs),
    /// Parse and merge only; report every conflict.
    Check(check::CheckArgs),
    /// Print the reconciled recipe text.
    Render(render::RenderArgs),
    /// List the built-in definitions.
    Variants(variants::VariantsArgs),
}

/// Definition inputs shared by every resolving command.
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Base recipe file. Defaults to the built-in base.
    #[arg(long, env = "VRESOLVE_BASE")]
    pub base: Option<PathBuf>,

    /// Overlay as NAME=FILE, or NAME for a built-in preset. Applied in order.
    #[arg(long = "overlay", value_name = "NAME[=FILE]")]
    pub overlays: Vec<OverlaySpec>,

    /// Build argument as NAME=VALUE. A later value for the same name wins.
    #[arg(long = "arg", value_name = "NAME=VALUE")]
    pub args: Vec<BuildArg>,

    /// Build context that COPY sources are hashed from.
    #[arg(long, env = "VRESOLVE_CONTEXT")]
    pub context: Option<PathBuf>,

    /// How differing COPY sources for one destination are judged.
    #[arg(long, env = "VRESOLVE_COPY_POLICY", value_name = "strict|content-hash")]
    pub copy_policy: Option<CopyPolicy>,

    /// YAML resolver configuration file.
    #[arg(long, env = CONFIG_PATH_ENV)]
    pub config: Option<PathBuf>,
}

impl InputArgs {
    /// Loads the config file, if any, and applies flag overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn resolver_config(&self) -> anyhow::Result<ResolverConfig> {
        let mut config = match &self.config {
            Some(path) => ResolverConfig::load(path)?,
            None => ResolverConfig::default(),
        };
        if let Some(policy) = self.copy_policy {
            config.copy_policy = policy;
        }
        if let Some(context) = &self.context {
            config.context_dir = Some(context.clone());
        }
        Ok(config)
    }

    /// Loads the base and every overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if any definition cannot be loaded or parsed.
    pub fn definitions(&self) -> anyhow::Result<Definitions> {
        Ok(Definitions::load(self.base.as_deref(), &self.overlays)?)
    }

    /// Build arguments as a name-to-value map.
    #[must_use]
    pub fn build_args(&self) -> BTreeMap<String, String> {
        collect_build_args(&self.args)
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Resolve(args) => resolve::execute(&args),
        Command::Check(args) => check::execute(&args),
        Command::Render(args) => render::execute(&args),
        Command::Variants(args) => variants::execute(&args),
    }
}
