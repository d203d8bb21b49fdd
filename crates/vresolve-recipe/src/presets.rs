//! Built-in OPTIMADE server deployment definitions.
//!
//! `base` holds the steps every variant shares. `generic` and
//! `materials-cloud` are overlays that differ in the bundled provider-index
//! file, the environment pointing the server at it, and how the server
//! configuration file is selected.

use vresolve_common::error::{Result, VresolveError};

use crate::step::Overlay;

/// A recipe shipped inside the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    /// Name used on the command line.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Recipe text.
    pub text: &'static str,
}

/// Name of the built-in base definition.
pub const BASE: &str = "base";

/// All built-in presets, base first.
pub const PRESETS: &[Preset] = &[
    Preset {
        name: BASE,
        description: "Python image, server install, run.sh entrypoint on port 5000",
        text: include_str!("../presets/base.recipe"),
    },
    Preset {
        name: "generic",
        description: "Bundles providers.json; copies ${CONFIG_FILE} to /app/optimade_config.json",
        text: include_str!("../presets/generic.recipe"),
    },
    Preset {
        name: "materials-cloud",
        description: "Bundles index_links.json; points OPTIMADE_CONFIG_FILE at /app/${CONFIG_FILE}",
        text: include_str!("../presets/materials-cloud.recipe"),
    },
];

/// Looks up a preset by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Parses the named preset into an overlay.
///
/// # Errors
///
/// Returns an error if no preset has that name.
pub fn load(name: &str) -> Result<Overlay> {
    let preset = find(name).ok_or_else(|| VresolveError::NotFound {
        kind: "preset",
        id: name.to_owned(),
    })?;
    tracing::debug!(preset = preset.name, "loading built-in preset");
    Overlay::parse(preset.name, preset.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    #[test]
    fn every_preset_parses() {
        for preset in PRESETS {
            let overlay = load(preset.name).expect("preset should parse");
            assert!(!overlay.steps().is_empty(), "{} is empty", preset.name);
        }
    }

    #[test]
    fn base_declares_single_entrypoint() {
        let base = load(BASE).expect("base");
        let entrypoints: Vec<_> = base
            .steps()
            .iter()
            .filter(|s| s.kind == StepKind::Entrypoint)
            .collect();
        assert_eq!(entrypoints.len(), 1);
        assert_eq!(entrypoints[0].target, "/app/run.sh");
    }

    #[test]
    fn variants_bundle_different_index_files() {
        let generic = load("generic").expect("generic");
        let mcloud = load("materials-cloud").expect("materials-cloud");
        assert!(
            generic
                .steps()
                .iter()
                .any(|s| s.target.ends_with("providers.json"))
        );
        assert!(
            mcloud
                .steps()
                .iter()
                .any(|s| s.kind == StepKind::Env && s.target == "OPTIMADE_INDEX_LINKS_PATH")
        );
    }

    #[test]
    fn unknown_preset_is_not_found() {
        let err = load("nope").unwrap_err();
        assert!(err.to_string().contains("preset not found"));
    }
}
