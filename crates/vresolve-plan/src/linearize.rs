//! Deterministic ordering and plan-wide invariants.
//!
//! Takes the merged, substituted steps and produces the [`ResolvedPlan`]:
//! steps keep declaration order inside a stable rank (FROM, body, EXPOSE,
//! ENTRYPOINT), exposed ports collapse to a set, and single-cardinality
//! kinds are enforced.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::graph::{Graph, NodeIndex};
use serde::Serialize;
use vresolve_recipe::parser::validator::parse_port;
use vresolve_recipe::{Origin, Relation, Step, StepKind};

use crate::error::ResolveError;

/// Non-fatal observation about a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    /// Step the note is about.
    pub origin: Origin,
    /// Human-readable note.
    pub message: String,
}

/// The linearized, deduplicated, conflict-free plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPlan {
    /// Steps in build order.
    pub steps: Vec<Step>,
    /// Final environment, last assignment wins.
    pub env: BTreeMap<String, String>,
    /// Exposed ports.
    pub exposed_ports: BTreeSet<u16>,
    /// The single ENTRYPOINT step.
    pub entrypoint: Step,
    /// Last WORKDIR, if any.
    pub workdir: Option<String>,
    /// Inert COPY notes and similar observations.
    pub advisories: Vec<Advisory>,
}

const fn rank(kind: StepKind) -> u8 {
    match kind {
        StepKind::From => 0,
        StepKind::Copy | StepKind::Run | StepKind::Env | StepKind::Arg | StepKind::Workdir => 1,
        StepKind::Expose => 2,
        StepKind::Entrypoint => 3,
    }
}

/// Consumption graph between COPY steps and the RUN/ENTRYPOINT steps that
/// mention their targets.
#[derive(Debug)]
pub struct StepGraph {
    graph: Graph<usize, ()>,
}

impl StepGraph {
    /// Builds the graph over `steps` in build order.
    #[must_use]
    pub fn build(steps: &[Step], workdir: Option<&str>) -> Self {
        let mut graph = Graph::new();
        let nodes: Vec<NodeIndex> = (0..steps.len()).map(|i| graph.add_node(i)).collect();
        for (i, copy) in steps.iter().enumerate() {
            if copy.kind != StepKind::Copy {
                continue;
            }
            for (j, consumer) in steps.iter().enumerate().skip(i + 1) {
                if matches!(consumer.kind, StepKind::Run | StepKind::Entrypoint)
                    && mentions(&consumer.target, &copy.target, workdir)
                {
                    let _ = graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }
        Self { graph }
    }

    /// Indices of steps with no outgoing edge among those of the given kind.
    #[must_use]
    pub fn unconsumed(&self, steps: &[Step], kind: StepKind) -> Vec<usize> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .filter_map(|n| self.graph.node_weight(n).copied())
            .filter(|&i| steps[i].kind == kind)
            .collect()
    }

    /// Number of consumption edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Whether `text` refers to the path a COPY wrote to.
fn mentions(text: &str, copy_target: &str, workdir: Option<&str>) -> bool {
    let relative = copy_target.trim_start_matches("./").trim_end_matches('/');
    if relative.is_empty() || relative == "." {
        return true;
    }
    if text.contains(relative) {
        return true;
    }
    workdir
        .map(|w| format!("{}/", w.trim_end_matches('/')))
        .and_then(|prefix| relative.strip_prefix(prefix.as_str()).map(str::to_owned))
        .is_some_and(|inner| !inner.is_empty() && text.contains(inner.as_str()))
}

fn violation(invariant: impl Into<String>, origins: Vec<Origin>) -> ResolveError {
    ResolveError::DependencyViolation {
        invariant: invariant.into(),
        origins,
    }
}

/// Collapses steps that only collide after substitution. Identical ones
/// are dropped; differing ones break the one-value-per-key invariant.
fn dedupe(steps: Vec<Step>) -> Result<Vec<Step>, ResolveError> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    let mut seen: HashMap<(StepKind, String), usize> = HashMap::new();
    for step in steps {
        if step.kind == StepKind::Env {
            out.push(step);
            continue;
        }
        let key = match step.kind {
            StepKind::Expose => (
                step.kind,
                parse_port(&step.target).map_or_else(|| step.target.clone(), |p| p.to_string()),
            ),
            _ => step.key(),
        };
        match seen.get(&key) {
            None => {
                let _ = seen.insert(key, out.len());
                out.push(step);
            }
            Some(&idx) => match out[idx].relation(&step) {
                Relation::Mergeable | Relation::Distinct => {
                    if out[idx].source.is_none() {
                        out[idx].source = step.source;
                    }
                }
                Relation::Override | Relation::Conflict => {
                    return Err(violation(
                        format!(
                            "{} {} has different values after argument substitution",
                            step.kind, step.target
                        ),
                        vec![out[idx].origin.clone(), step.origin],
                    ));
                }
            },
        }
    }
    Ok(out)
}

fn single(steps: &[Step], kind: StepKind, required: bool) -> Result<Option<&Step>, ResolveError> {
    let found: Vec<&Step> = steps.iter().filter(|s| s.kind == kind).collect();
    match found.as_slice() {
        [] if required => Err(violation(format!("no {kind} declared"), Vec::new())),
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        many => Err(violation(
            format!("more than one {kind} after merging"),
            many.iter().map(|s| s.origin.clone()).collect(),
        )),
    }
}

fn exposed_ports(steps: &[Step]) -> Result<BTreeSet<u16>, ResolveError> {
    steps
        .iter()
        .filter(|s| s.kind == StepKind::Expose)
        .map(|s| {
            parse_port(&s.target).ok_or_else(|| ResolveError::InvalidPort {
                value: s.target.clone(),
                origin: s.origin.clone(),
            })
        })
        .collect()
}

/// Orders and validates merged, substituted steps.
///
/// # Errors
///
/// Returns [`ResolveError::DependencyViolation`] when there is not exactly
/// one ENTRYPOINT, more than one FROM, or a key resolves to two values;
/// [`ResolveError::InvalidPort`] for an EXPOSE that is not a port.
pub fn linearize(steps: Vec<Step>) -> Result<ResolvedPlan, ResolveError> {
    let mut steps = dedupe(steps)?;
    steps.sort_by_key(|s| rank(s.kind));

    let _ = single(&steps, StepKind::From, false)?;
    let entrypoint = single(&steps, StepKind::Entrypoint, true)?
        .cloned()
        .ok_or_else(|| violation("no ENTRYPOINT declared", Vec::new()))?;
    let exposed_ports = exposed_ports(&steps)?;

    let workdir = steps
        .iter()
        .rev()
        .find(|s| s.kind == StepKind::Workdir)
        .map(|s| s.target.clone());

    let graph = StepGraph::build(&steps, workdir.as_deref());
    let advisories: Vec<Advisory> = graph
        .unconsumed(&steps, StepKind::Copy)
        .into_iter()
        .map(|i| {
            let step = &steps[i];
            tracing::info!(
                target = %step.target,
                origin = %step.origin,
                "COPY target is not referenced by any later RUN or ENTRYPOINT"
            );
            Advisory {
                origin: step.origin.clone(),
                message: format!(
                    "COPY target {} is not referenced by any later RUN or ENTRYPOINT",
                    step.target
                ),
            }
        })
        .collect();

    let env = crate::emit::fold_env(&steps);
    tracing::info!(
        steps = steps.len(),
        ports = exposed_ports.len(),
        consumed_copies = graph.edge_count(),
        advisories = advisories.len(),
        "plan linearized"
    );

    Ok(ResolvedPlan {
        steps,
        env,
        exposed_ports,
        entrypoint,
        workdir,
        advisories,
    })
}
