//! Loading base and overlay definitions.
//!
//! Each source is read once, fully, and closed before anything is merged.
//! A definition named without a file comes from the built-in presets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use vresolve_common::constants::BASE_ORIGIN;
use vresolve_common::error::{Result, VresolveError};

use crate::presets;
use crate::step::{Overlay, Step};

/// An overlay named on the command line: `NAME=FILE`, or `NAME` for a preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySpec {
    /// Overlay name, used as the origin of its steps.
    pub name: String,
    /// Recipe file; `None` selects the built-in preset of that name.
    pub path: Option<PathBuf>,
}

impl FromStr for OverlaySpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, path) = match s.split_once('=') {
            Some((name, path)) if path.is_empty() => {
                return Err(format!("overlay \"{name}\" has an empty file path"));
            }
            Some((name, path)) => (name, Some(PathBuf::from(path))),
            None => (s, None),
        };
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(format!(
                "invalid overlay name \"{name}\" (use letters, digits, '-', '_' or '.')"
            ));
        }
        Ok(Self {
            name: name.to_owned(),
            path,
        })
    }
}

/// Reads and parses one recipe file under the given definition name.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_definition(name: &str, path: &Path) -> Result<Overlay> {
    tracing::info!(name, path = %path.display(), "loading definition");
    let text = std::fs::read_to_string(path).map_err(|e| VresolveError::io(path, e))?;
    Overlay::parse(name, &text)
}

/// Loads the base definition from `path`, or the built-in base.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_base(path: Option<&Path>) -> Result<Overlay> {
    match path {
        Some(path) => load_definition(BASE_ORIGIN, path),
        None => presets::load(presets::BASE),
    }
}

/// Loads one overlay from its file or from the presets.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or names
/// an unknown preset.
pub fn load_overlay(spec: &OverlaySpec) -> Result<Overlay> {
    match &spec.path {
        Some(path) => load_definition(&spec.name, path),
        None => presets::load(&spec.name),
    }
}

/// The base definition and its overlays, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definitions {
    /// Shared base steps.
    pub base: Overlay,
    /// Variant overlays, applied in order.
    pub overlays: Vec<Overlay>,
}

impl Definitions {
    /// Loads the base and every overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if any source fails to load, if an overlay reuses
    /// the reserved base name, or if two overlays share a name.
    pub fn load(base: Option<&Path>, overlays: &[OverlaySpec]) -> Result<Self> {
        let mut seen = HashSet::new();
        for spec in overlays {
            if spec.name == BASE_ORIGIN {
                return Err(VresolveError::Config {
                    message: format!("overlay name \"{BASE_ORIGIN}\" is reserved for the base"),
                });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(VresolveError::Config {
                    message: format!("overlay \"{}\" is given more than once", spec.name),
                });
            }
        }

        let base = load_base(base)?;
        let overlays = overlays
            .iter()
            .map(load_overlay)
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(
            base_steps = base.steps().len(),
            overlays = overlays.len(),
            "definitions loaded"
        );
        Ok(Self { base, overlays })
    }

    /// Iterates over every step of the base and then of each overlay.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.base
            .steps()
            .iter()
            .chain(self.overlays.iter().flat_map(|o| o.steps().iter()))
    }
}
