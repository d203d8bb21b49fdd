//! Build argument resolution and `${NAME}` substitution.
//!
//! Lookup order for a placeholder: explicit build argument, then declared
//! ARG default, then the value of an ENV declared earlier in the sequence.
//! Substituted text is never rescanned, and values that carry placeholder
//! syntax are refused, so resolving a resolved sequence again changes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::char,
    sequence::delimited,
};
use vresolve_recipe::parser::lexer::is_valid_name;
use vresolve_recipe::{Step, StepKind};

use crate::error::ResolveError;

/// A `NAME=VALUE` build argument given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArg {
    /// Argument name.
    pub name: String,
    /// Literal value.
    pub value: String,
}

impl FromStr for BuildArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("build argument \"{s}\" must be NAME=VALUE"))?;
        if !is_valid_name(name) {
            return Err(format!("invalid build argument name \"{name}\""));
        }
        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Collects build arguments into a map; later duplicates win.
#[must_use]
pub fn collect_build_args(args: &[BuildArg]) -> BTreeMap<String, String> {
    args.iter()
        .map(|a| (a.name.clone(), a.value.clone()))
        .collect()
}

/// Piece of a template string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn literal(input: &str) -> IResult<&str, &str> {
    take_until("${")(input)
}

fn placeholder(input: &str) -> IResult<&str, &str> {
    delimited(
        tag("${"),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        char('}'),
    )
    .parse(input)
}

/// Splits `text` into literals and placeholders. On malformed syntax returns
/// the offending text, e.g. `${}` or an unterminated `${NAME`.
fn segments(text: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut out = Vec::new();
    let mut remaining = text;
    loop {
        let Ok((at, lit)) = literal(remaining) else {
            if !remaining.is_empty() {
                out.push(Segment::Literal(remaining));
            }
            return Ok(out);
        };
        if !lit.is_empty() {
            out.push(Segment::Literal(lit));
        }
        match placeholder(at) {
            Ok((after, name)) if is_valid_name(name) => {
                out.push(Segment::Placeholder(name));
                remaining = after;
            }
            _ => {
                let end = at.find('}').map_or(at.len(), |i| i + 1);
                return Err(at[..end].to_owned());
            }
        }
    }
}

/// Whether `text` contains any `${` sequence.
#[must_use]
pub fn has_placeholder(text: &str) -> bool {
    text.contains("${")
}

/// Defaults declared by ARG steps, first declaration with a default wins.
#[must_use]
pub fn declared_defaults(steps: &[Step]) -> BTreeMap<String, String> {
    let mut defaults = BTreeMap::new();
    for step in steps.iter().filter(|s| s.kind == StepKind::Arg) {
        if let Some(default) = &step.source {
            let _ = defaults
                .entry(step.target.clone())
                .or_insert_with(|| default.clone());
        }
    }
    defaults
}

struct Substituter<'a> {
    build_args: &'a BTreeMap<String, String>,
    arg_defaults: &'a BTreeMap<String, String>,
    env: BTreeMap<String, String>,
    consumed: BTreeSet<String>,
}

impl Substituter<'_> {
    fn lookup(&mut self, name: &str) -> Option<String> {
        if let Some(value) = self.build_args.get(name) {
            let _ = self.consumed.insert(name.to_owned());
            return Some(value.clone());
        }
        self.arg_defaults
            .get(name)
            .or_else(|| self.env.get(name))
            .cloned()
    }

    fn expand(&mut self, text: &str, step: &Step) -> Result<String, ResolveError> {
        if !has_placeholder(text) {
            return Ok(text.to_owned());
        }
        let parts = segments(text).map_err(|raw| unresolved(raw, step))?;
        let mut out = String::with_capacity(text.len());
        for part in parts {
            match part {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Placeholder(name) => {
                    let value = self
                        .lookup(name)
                        .ok_or_else(|| unresolved(name.to_owned(), step))?;
                    tracing::debug!(name, origin = %step.origin, "substituted placeholder");
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

fn unresolved(name: String, step: &Step) -> ResolveError {
    ResolveError::UnresolvedArgument {
        name,
        kind: step.kind,
        origin: step.origin.clone(),
    }
}

fn refuse_nested(values: &BTreeMap<String, String>) -> Result<(), ResolveError> {
    match values.iter().find(|(_, v)| has_placeholder(v)) {
        Some((name, value)) => Err(ResolveError::NestedPlaceholder {
            name: name.clone(),
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

/// Substitutes every `${NAME}` placeholder in the targets and sources of
/// non-ARG steps.
///
/// # Errors
///
/// Returns [`ResolveError::UnresolvedArgument`] for a placeholder with no
/// value or with malformed syntax, and [`ResolveError::NestedPlaceholder`]
/// when a build argument or default carries placeholder syntax itself.
pub fn resolve(
    steps: &[Step],
    build_args: &BTreeMap<String, String>,
    arg_defaults: &BTreeMap<String, String>,
) -> Result<Vec<Step>, ResolveError> {
    refuse_nested(build_args)?;
    refuse_nested(arg_defaults)?;

    let mut sub = Substituter {
        build_args,
        arg_defaults,
        env: BTreeMap::new(),
        consumed: BTreeSet::new(),
    };

    let mut resolved = Vec::with_capacity(steps.len());
    for step in steps {
        if step.kind == StepKind::Arg {
            resolved.push(step.clone());
            continue;
        }
        let target = sub.expand(&step.target, step)?;
        let source = step
            .source
            .as_deref()
            .map(|s| sub.expand(s, step))
            .transpose()?;
        if step.kind == StepKind::Env {
            let _ = sub
                .env
                .insert(target.clone(), source.clone().unwrap_or_default());
        }
        resolved.push(Step {
            kind: step.kind,
            target,
            source,
            origin: step.origin.clone(),
        });
    }

    for name in build_args.keys().filter(|n| !sub.consumed.contains(*n)) {
        tracing::warn!(name = %name, "build argument was not consumed by any step");
    }
    tracing::info!(steps = resolved.len(), "arguments resolved");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vresolve_recipe::Origin;

    fn step(kind: StepKind, target: &str, source: &str) -> Step {
        Step::new(kind, target, source, Origin::new("base", 1))
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn segments_split_literals_and_placeholders() {
        let parts = segments("/app/${CONFIG_FILE}.bak").expect("segments");
        assert_eq!(
            parts,
            vec![
                Segment::Literal("/app/"),
                Segment::Placeholder("CONFIG_FILE"),
                Segment::Literal(".bak"),
            ]
        );
    }

    #[test]
    fn segments_report_malformed_text() {
        assert_eq!(segments("a ${} b"), Err("${}".to_owned()));
        assert_eq!(segments("a ${1X} b"), Err("${1X}".to_owned()));
        assert_eq!(segments("${OPEN"), Err("${OPEN".to_owned()));
    }

    #[test]
    fn bare_dollar_is_left_alone() {
        let steps = vec![step(StepKind::Run, "echo $HOME", "echo $HOME")];
        let out = resolve(&steps, &BTreeMap::new(), &BTreeMap::new()).expect("resolve");
        assert_eq!(out, steps);
    }

    #[test]
    fn default_is_used_without_override() {
        let steps = vec![
            step(StepKind::Arg, "CONFIG_FILE", "optimade_config.json"),
            step(StepKind::Copy, "./optimade_config.json", "${CONFIG_FILE}"),
        ];
        let defaults = declared_defaults(&steps);
        let out = resolve(&steps, &BTreeMap::new(), &defaults).expect("resolve");
        assert_eq!(out[1].source.as_deref(), Some("optimade_config.json"));
    }

    #[test]
    fn override_beats_default() {
        let steps = vec![
            step(StepKind::Arg, "CONFIG_FILE", "optimade_config.json"),
            step(StepKind::Env, "OPTIMADE_CONFIG_FILE", "/app/${CONFIG_FILE}"),
        ];
        let defaults = declared_defaults(&steps);
        let args = map(&[("CONFIG_FILE", "custom.json")]);
        let out = resolve(&steps, &args, &defaults).expect("resolve");
        assert_eq!(out[1].source.as_deref(), Some("/app/custom.json"));
        assert_eq!(out[0], steps[0]);
    }

    #[test]
    fn earlier_env_is_visible_to_later_steps() {
        let steps = vec![
            step(StepKind::Env, "APP_HOME", "/app"),
            step(StepKind::Run, "ls ${APP_HOME}", "ls ${APP_HOME}"),
        ];
        let out = resolve(&steps, &BTreeMap::new(), &BTreeMap::new()).expect("resolve");
        assert_eq!(out[1].target, "ls /app");
    }

    #[test]
    fn later_env_is_not_visible_to_earlier_steps() {
        let steps = vec![
            step(StepKind::Run, "ls ${APP_HOME}", "ls ${APP_HOME}"),
            step(StepKind::Env, "APP_HOME", "/app"),
        ];
        let err = resolve(&steps, &BTreeMap::new(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvedArgument { ref name, .. } if name == "APP_HOME"));
    }

    #[test]
    fn bare_arg_without_override_is_unresolved() {
        let steps = vec![
            Step::bare_arg("PORT", Origin::new("base", 1)),
            step(StepKind::Expose, "${PORT}", "${PORT}"),
        ];
        let defaults = declared_defaults(&steps);
        let err = resolve(&steps, &BTreeMap::new(), &defaults).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnresolvedArgument { ref name, kind: StepKind::Expose, .. } if name == "PORT"
        ));
    }

    #[test]
    fn malformed_placeholder_is_unresolved() {
        let steps = vec![step(StepKind::Run, "echo ${}", "echo ${}")];
        let err = resolve(&steps, &BTreeMap::new(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvedArgument { ref name, .. } if name == "${}"));
    }

    #[test]
    fn nested_placeholder_values_are_refused() {
        let steps = vec![step(StepKind::Run, "echo ${A}", "echo ${A}")];
        let args = map(&[("A", "${B}")]);
        let err = resolve(&steps, &args, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ResolveError::NestedPlaceholder { ref name, .. } if name == "A"));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let steps = vec![
            step(StepKind::Arg, "CONFIG_FILE", "optimade_config.json"),
            step(StepKind::Copy, "./${CONFIG_FILE}", "${CONFIG_FILE}"),
            step(StepKind::Env, "OPTIMADE_CONFIG_FILE", "/app/${CONFIG_FILE}"),
        ];
        let defaults = declared_defaults(&steps);
        let args = map(&[("CONFIG_FILE", "x.json")]);
        let once = resolve(&steps, &args, &defaults).expect("first pass");
        let twice = resolve(&once, &args, &defaults).expect("second pass");
        assert_eq!(once, twice);
    }

    #[test]
    fn build_arg_parsing() {
        let arg: BuildArg = "CONFIG_FILE=optimade_config.json".parse().expect("parse");
        assert_eq!(arg.name, "CONFIG_FILE");
        assert_eq!(arg.value, "optimade_config.json");
        let empty: BuildArg = "EMPTY=".parse().expect("parse");
        assert!(empty.value.is_empty());
        assert!("NOVALUE".parse::<BuildArg>().is_err());
        assert!("1BAD=x".parse::<BuildArg>().is_err());
    }

    #[test]
    fn later_build_arg_wins() {
        let args = vec![
            "A=1".parse::<BuildArg>().expect("parse"),
            "A=2".parse::<BuildArg>().expect("parse"),
        ];
        assert_eq!(collect_build_args(&args).get("A").map(String::as_str), Some("2"));
    }
}
