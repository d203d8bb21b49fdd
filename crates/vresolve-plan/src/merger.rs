//! Layering overlays over the base definition.
//!
//! Steps are inserted in declaration order (base first, then each overlay)
//! into an ordered collection keyed by `(kind, target)`. Merging never
//! aborts early: every conflict is collected so the caller sees the full
//! set in one pass.
//!
//! A deduplicated step keeps its base origin if it has one; otherwise it
//! keeps the smallest overlay origin, so overlay order never shows in the
//! merged steps.

use std::collections::HashMap;

use vresolve_recipe::digest::DigestIndex;
use vresolve_recipe::{Overlay, Relation, Step, StepKey, StepKind};

use crate::error::{ConflictEntry, ConflictReport, Contender};

/// Result of a merge: the merged steps and every conflict found.
///
/// `steps` is only meaningful when `conflicts` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Merged steps in first-seen order.
    pub steps: Vec<Step>,
    /// Conflicts that kept incoming steps out of `steps`.
    pub conflicts: ConflictReport,
}

/// Ordered accumulator of merged steps.
#[derive(Debug, Default)]
struct Accumulator {
    steps: Vec<Step>,
    /// Parallel to `steps`: whether the entry came from the base.
    base_origin: Vec<bool>,
    by_key: HashMap<StepKey, Vec<usize>>,
    conflicts: ConflictReport,
}

impl Accumulator {
    fn insert(&mut self, step: &Step, from_base: bool, digests: &DigestIndex) {
        let key = step.key();
        let Some(&latest) = self.by_key.get(&key).and_then(|idx| idx.last()) else {
            self.push(key, step, from_base);
            return;
        };

        let pinned = self.base_origin[latest];
        let existing = &mut self.steps[latest];
        match existing.relation_with(step, digests) {
            Relation::Mergeable => {
                let dropped = if !pinned && step.origin < existing.origin {
                    let kept_source = existing.source.take();
                    let previous = std::mem::replace(existing, step.clone());
                    if existing.source.is_none() {
                        existing.source = kept_source;
                    }
                    previous.origin
                } else {
                    if existing.source.is_none() && step.source.is_some() {
                        existing.source.clone_from(&step.source);
                    }
                    step.origin.clone()
                };
                tracing::debug!(
                    kind = %step.kind,
                    target = %step.target,
                    kept = %existing.origin,
                    %dropped,
                    "deduplicated step"
                );
            }
            Relation::Override => {
                tracing::debug!(
                    name = %step.target,
                    from = %existing.origin,
                    by = %step.origin,
                    "ENV override"
                );
                self.push(key, step, from_base);
            }
            Relation::Conflict => {
                tracing::warn!(
                    kind = %step.kind,
                    target = %step.target,
                    existing = %existing.origin,
                    incoming = %step.origin,
                    "merge conflict"
                );
                let entry = ConflictEntry {
                    kind: step.kind,
                    target: step.target.clone(),
                    existing: Contender {
                        origin: existing.origin.clone(),
                        source: existing.source.clone(),
                    },
                    incoming: Contender {
                        origin: step.origin.clone(),
                        source: step.source.clone(),
                    },
                };
                self.conflicts.push(entry);
            }
            Relation::Distinct => self.push(key, step, from_base),
        }
    }

    fn push(&mut self, key: StepKey, step: &Step, from_base: bool) {
        self.by_key.entry(key).or_default().push(self.steps.len());
        self.steps.push(step.clone());
        self.base_origin.push(from_base);
    }
}

/// Merges the base with each overlay in declaration order, treating any
/// COPY source mismatch as a conflict.
#[must_use]
pub fn merge(base: &[Step], overlays: &[Overlay]) -> MergeOutcome {
    merge_with(base, overlays, &DigestIndex::default())
}

/// Merges like [`merge`], letting COPY steps whose sources have identical
/// recorded digests deduplicate.
#[must_use]
pub fn merge_with(base: &[Step], overlays: &[Overlay], digests: &DigestIndex) -> MergeOutcome {
    let mut acc = Accumulator::default();
    for step in base {
        acc.insert(step, true, digests);
    }
    for overlay in overlays {
        tracing::debug!(overlay = overlay.name(), steps = overlay.steps().len(), "applying overlay");
        for step in overlay.steps() {
            acc.insert(step, false, digests);
        }
    }
    tracing::info!(
        merged = acc.steps.len(),
        conflicts = acc.conflicts.len(),
        "merge finished"
    );
    MergeOutcome {
        steps: acc.steps,
        conflicts: acc.conflicts,
    }
}

/// Number of ENV steps that override an earlier assignment of the same name.
#[must_use]
pub fn override_count(steps: &[Step]) -> usize {
    let mut seen = std::collections::HashSet::new();
    steps
        .iter()
        .filter(|s| s.kind == StepKind::Env && !seen.insert(s.target.as_str()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vresolve_common::types::ContentDigest;
    use vresolve_recipe::Origin;

    fn step(kind: StepKind, target: &str, source: &str, def: &str, line: usize) -> Step {
        Step::new(kind, target, source, Origin::new(def, line))
    }

    fn overlay(name: &str, steps: Vec<Step>) -> Overlay {
        Overlay::new(name, steps)
    }

    #[test]
    fn merge_without_overlays_keeps_base() {
        let base = vec![
            step(StepKind::Workdir, "/app", "/app", "base", 1),
            step(StepKind::Expose, "5000", "5000", "base", 2),
        ];
        let outcome = merge(&base, &[]);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.steps, base);
    }

    #[test]
    fn duplicate_copy_keeps_first_position() {
        let base = vec![
            step(StepKind::Copy, "./run.sh", "run.sh", "base", 1),
            step(StepKind::Run, "pip install .", "pip install .", "base", 2),
        ];
        let ov = overlay(
            "mcloud",
            vec![
                step(StepKind::Expose, "5000", "5000", "mcloud", 1),
                step(StepKind::Copy, "./run.sh", "run.sh", "mcloud", 2),
            ],
        );
        let outcome = merge(&base, &[ov]);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.steps[0].target, "./run.sh");
        assert_eq!(outcome.steps[0].origin, Origin::new("base", 1));
    }

    #[test]
    fn shared_overlay_step_origin_ignores_overlay_order() {
        let a = overlay("a", vec![step(StepKind::Env, "MODE", "x", "a", 1)]);
        let b = overlay("b", vec![step(StepKind::Env, "MODE", "x", "b", 1)]);
        let forward = merge(&[], &[a.clone(), b.clone()]);
        let reverse = merge(&[], &[b, a]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.steps[0].origin, Origin::new("a", 1));
    }

    #[test]
    fn base_origin_is_kept_over_smaller_overlay_name() {
        let base = vec![step(StepKind::Copy, "./run.sh", "run.sh", "base", 4)];
        let ov = overlay("a", vec![step(StepKind::Copy, "./run.sh", "run.sh", "a", 1)]);
        let outcome = merge(&base, &[ov]);
        assert_eq!(outcome.steps[0].origin, Origin::new("base", 4));
    }

    #[test]
    fn all_conflicts_are_collected() {
        let base = vec![
            step(StepKind::Copy, "./config.json", "a.json", "base", 1),
            step(StepKind::Arg, "CONFIG_FILE", "a.json", "base", 2),
        ];
        let ov = overlay(
            "mcloud",
            vec![
                step(StepKind::Copy, "./config.json", "b.json", "mcloud", 1),
                step(StepKind::Arg, "CONFIG_FILE", "b.json", "mcloud", 2),
            ],
        );
        let outcome = merge(&base, &[ov]);
        assert_eq!(outcome.conflicts.len(), 2);
        let first = &outcome.conflicts.entries()[0];
        assert_eq!(first.kind, StepKind::Copy);
        assert_eq!(first.existing.origin, Origin::new("base", 1));
        assert_eq!(first.incoming.origin, Origin::new("mcloud", 1));
        assert_eq!(outcome.steps.len(), 2);
    }

    #[test]
    fn env_reassignment_is_kept_as_override() {
        let base = vec![step(StepKind::Env, "X", "1", "base", 1)];
        let ov = overlay("ov", vec![step(StepKind::Env, "X", "2", "ov", 1)]);
        let outcome = merge(&base, &[ov]);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(override_count(&outcome.steps), 1);
    }

    #[test]
    fn env_compares_against_latest_value() {
        let base = vec![step(StepKind::Env, "X", "1", "base", 1)];
        let a = overlay("a", vec![step(StepKind::Env, "X", "2", "a", 1)]);
        let b = overlay("b", vec![step(StepKind::Env, "X", "1", "b", 1)]);
        let outcome = merge(&base, &[a, b]);
        let values: Vec<&str> = outcome.steps.iter().map(Step::source_text).collect();
        assert_eq!(values, vec!["1", "2", "1"]);
    }

    #[test]
    fn bare_arg_adopts_later_default() {
        let base = vec![Step::bare_arg("CONFIG_FILE", Origin::new("base", 1))];
        let ov = overlay(
            "generic",
            vec![step(StepKind::Arg, "CONFIG_FILE", "optimade_config.json", "generic", 3)],
        );
        let outcome = merge(&base, &[ov]);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].source.as_deref(), Some("optimade_config.json"));
        assert_eq!(outcome.steps[0].origin, Origin::new("base", 1));
    }

    #[test]
    fn distinct_entrypoints_both_survive_merge() {
        let base = vec![step(StepKind::Entrypoint, "/app/run.sh", "/app/run.sh", "base", 9)];
        let ov = overlay(
            "ov",
            vec![step(StepKind::Entrypoint, "/app/other.sh", "/app/other.sh", "ov", 1)],
        );
        let outcome = merge(&base, &[ov]);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.steps.len(), 2);
    }

    #[test]
    fn content_identical_copies_merge_with_digests() {
        let base = vec![step(StepKind::Copy, "./config.json", "a.json", "base", 1)];
        let ov = overlay(
            "ov",
            vec![step(StepKind::Copy, "./config.json", "b.json", "ov", 1)],
        );
        let digest = ContentDigest::from_hex("ab".repeat(32)).expect("digest");
        let mut digests = DigestIndex::default();
        digests.insert("a.json", digest.clone());
        digests.insert("b.json", digest);

        assert_eq!(merge(&base, std::slice::from_ref(&ov)).conflicts.len(), 1);
        let outcome = merge_with(&base, &[ov], &digests);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.steps.len(), 1);
    }
}
