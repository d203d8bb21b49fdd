//! Static validation of a parsed recipe definition.
//!
//! Checks what can be decided from one definition alone. Cross-definition
//! rules (conflicts, single ENTRYPOINT) belong to the resolver.

use vresolve_common::error::{Result, VresolveError};

use super::lexer::is_valid_name;
use crate::step::{Step, StepKind};

/// Parses a TCP port in `1..=65535`.
#[must_use]
pub fn parse_port(text: &str) -> Option<u16> {
    text.parse::<u16>().ok().filter(|p| *p != 0)
}

/// Validates the steps of a single definition.
///
/// # Checks performed
///
/// 1. ENV and ARG names are valid identifiers.
/// 2. Literal EXPOSE values are ports in `1..=65535`.
/// 3. No value contains a NUL byte.
///
/// # Errors
///
/// Returns an error naming the first offending line.
pub fn validate(origin: &str, steps: &[Step]) -> Result<()> {
    for step in steps {
        check_name(origin, step)?;
        check_port(origin, step)?;
        check_nul(origin, step)?;
    }
    Ok(())
}

fn invalid(origin: &str, step: &Step, message: String) -> VresolveError {
    VresolveError::Parse {
        origin: origin.to_owned(),
        line: step.origin.line,
        message,
    }
}

fn check_name(origin: &str, step: &Step) -> Result<()> {
    if matches!(step.kind, StepKind::Env | StepKind::Arg) && !is_valid_name(&step.target) {
        return Err(invalid(
            origin,
            step,
            format!("invalid {} name \"{}\"", step.kind, step.target),
        ));
    }
    Ok(())
}

fn check_port(origin: &str, step: &Step) -> Result<()> {
    if step.kind == StepKind::Expose
        && !step.target.contains("${")
        && parse_port(&step.target).is_none()
    {
        return Err(invalid(
            origin,
            step,
            format!("EXPOSE value \"{}\" is not a port in 1..=65535", step.target),
        ));
    }
    Ok(())
}

fn check_nul(origin: &str, step: &Step) -> Result<()> {
    if step.target.contains('\0') || step.source_text().contains('\0') {
        return Err(invalid(origin, step, "value contains a NUL byte".into()));
    }
    Ok(())
}
