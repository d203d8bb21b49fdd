//! Recipe parser built on `nom`.
//!
//! Transforms raw recipe text into validated [`Step`]s through line
//! splitting, per-instruction parsing, and static validation.

pub mod lexer;
pub mod validator;

use vresolve_common::error::{Result, VresolveError};

use self::lexer::LogicalLine;
use crate::step::{Origin, Step, StepKind};

fn parse_err(origin: &str, line: usize, message: impl Into<String>) -> VresolveError {
    VresolveError::Parse {
        origin: origin.to_owned(),
        line,
        message: message.into(),
    }
}

/// Parses a recipe definition named `origin` from its source text.
///
/// # Errors
///
/// Returns an error if the input contains syntax errors or fails validation.
pub fn parse_recipe(origin: &str, input: &str) -> Result<Vec<Step>> {
    tracing::debug!(origin, "parsing recipe");
    let lines = lexer::logical_lines(origin, input)?;
    let mut steps = Vec::with_capacity(lines.len());
    for line in &lines {
        parse_instruction(origin, line, &mut steps)?;
    }
    validator::validate(origin, &steps)?;
    tracing::debug!(origin, steps = steps.len(), "recipe parsed");
    Ok(steps)
}

fn parse_instruction(origin: &str, line: &LogicalLine, steps: &mut Vec<Step>) -> Result<()> {
    let Some(kind) = StepKind::from_keyword(&line.keyword) else {
        return Err(parse_err(
            origin,
            line.number,
            format!("unknown instruction: {}", line.keyword),
        ));
    };
    if line.rest.is_empty() {
        return Err(parse_err(
            origin,
            line.number,
            format!("{kind} requires at least one argument"),
        ));
    }
    let at = Origin::new(origin, line.number);

    match kind {
        StepKind::Run => steps.push(Step::new(kind, &line.rest, &line.rest, at)),
        StepKind::From | StepKind::Workdir => {
            let value = single_word(origin, line, kind)?;
            steps.push(Step::new(kind, &value, &value, at));
        }
        StepKind::Copy => parse_copy(origin, line, at, steps)?,
        StepKind::Env => parse_env(origin, line, at, steps)?,
        StepKind::Arg => steps.push(parse_arg(origin, line, at)?),
        StepKind::Expose => {
            for port in lexer::words(origin, line.number, &line.rest)? {
                let port = port.strip_suffix("/tcp").unwrap_or(&port).to_owned();
                steps.push(Step::new(kind, &port, &port, at.clone()));
            }
        }
        StepKind::Entrypoint => {
            let path = match lexer::exec_form(origin, line.number, &line.rest)? {
                Some(argv) if argv.len() == 1 => argv.into_iter().next().unwrap_or_default(),
                Some(argv) => {
                    return Err(parse_err(
                        origin,
                        line.number,
                        format!(
                            "ENTRYPOINT exec form must name exactly one path, got {}",
                            argv.len()
                        ),
                    ));
                }
                None => single_word(origin, line, kind)?,
            };
            steps.push(Step::new(kind, &path, &path, at));
        }
    }
    Ok(())
}

fn single_word(origin: &str, line: &LogicalLine, kind: StepKind) -> Result<String> {
    let mut items = lexer::words(origin, line.number, &line.rest)?;
    if items.len() != 1 {
        return Err(parse_err(
            origin,
            line.number,
            format!("{kind} takes exactly one argument, got {}", items.len()),
        ));
    }
    Ok(items.remove(0))
}

fn parse_copy(origin: &str, line: &LogicalLine, at: Origin, steps: &mut Vec<Step>) -> Result<()> {
    let mut items = match lexer::exec_form(origin, line.number, &line.rest)? {
        Some(argv) => argv,
        None => lexer::words(origin, line.number, &line.rest)?,
    };
    if items.iter().any(|i| i.starts_with("--")) {
        return Err(parse_err(origin, line.number, "COPY flags are not supported"));
    }
    if items.len() < 2 {
        return Err(parse_err(
            origin,
            line.number,
            "COPY requires a source and a destination",
        ));
    }
    let dest = items.pop().unwrap_or_default();
    if items.len() > 1 && !dest.ends_with('/') {
        return Err(parse_err(
            origin,
            line.number,
            format!("COPY with several sources needs a destination ending in '/', got \"{dest}\""),
        ));
    }
    for src in items {
        let target = if dest.ends_with('/') {
            format!("{dest}{}", basename(&src))
        } else {
            dest.clone()
        };
        steps.push(Step::new(StepKind::Copy, target, src, at.clone()));
    }
    Ok(())
}

fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn parse_env(origin: &str, line: &LogicalLine, at: Origin, steps: &mut Vec<Step>) -> Result<()> {
    if let Some(pairs) = lexer::assignments(&line.rest) {
        for (name, value) in pairs {
            steps.push(Step::new(StepKind::Env, name, value, at.clone()));
        }
        return Ok(());
    }
    match lexer::name_and_rest(&line.rest) {
        Some((name, value)) if !value.is_empty() => {
            let value = unquote_single(origin, line, value)?;
            steps.push(Step::new(StepKind::Env, name, value, at));
            Ok(())
        }
        _ => Err(parse_err(
            origin,
            line.number,
            format!("ENV expects NAME value or NAME=value, got \"{}\"", line.rest),
        )),
    }
}

/// Strips the quotes from a value that is exactly one quoted word; any
/// other text is kept as written.
fn unquote_single(origin: &str, line: &LogicalLine, value: String) -> Result<String> {
    if !value.starts_with('"') {
        return Ok(value);
    }
    let mut items = lexer::words(origin, line.number, &value)?;
    if items.len() == 1 {
        return Ok(items.remove(0));
    }
    Ok(value)
}

fn parse_arg(origin: &str, line: &LogicalLine, at: Origin) -> Result<Step> {
    if let Some(mut pairs) = lexer::assignments(&line.rest) {
        if pairs.len() == 1 {
            let (name, default) = pairs.remove(0);
            return Ok(Step::new(StepKind::Arg, name, default, at));
        }
        return Err(parse_err(origin, line.number, "ARG declares one name per line"));
    }
    let items = lexer::words(origin, line.number, &line.rest)?;
    match items.as_slice() {
        [name] => Ok(Step::bare_arg(name.clone(), at)),
        [name, default] => Ok(Step::new(StepKind::Arg, name.clone(), default.clone(), at)),
        _ => Err(parse_err(
            origin,
            line.number,
            format!("ARG expects NAME, NAME=default or NAME default, got \"{}\"", line.rest),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_input() {
        let steps = parse_recipe("base", "").expect("should parse empty input");
        assert!(steps.is_empty());
    }

    #[test]
    fn parse_copy_single_source() {
        let steps = parse_recipe("base", "COPY run.sh ./run.sh").expect("should parse");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, StepKind::Copy);
        assert_eq!(steps[0].target, "./run.sh");
        assert_eq!(steps[0].source.as_deref(), Some("run.sh"));
        assert_eq!(steps[0].origin, Origin::new("base", 1));
    }

    #[test]
    fn parse_copy_several_sources_expands_targets() {
        let steps =
            parse_recipe("base", "COPY setup.py LICENSE .docker/run.sh ./").expect("should parse");
        let targets: Vec<&str> = steps.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(targets, vec!["./setup.py", "./LICENSE", "./run.sh"]);
        assert_eq!(steps[2].source.as_deref(), Some(".docker/run.sh"));
    }

    #[test]
    fn parse_copy_several_sources_needs_directory() {
        let err = parse_recipe("base", "COPY a b ./c").unwrap_err();
        assert!(err.to_string().contains("ending in '/'"), "got: {err}");
    }

    #[test]
    fn parse_copy_exec_form() {
        let steps = parse_recipe("base", r#"COPY ["my file.json", "/app/"]"#).expect("should parse");
        assert_eq!(steps[0].target, "/app/my file.json");
    }

    #[test]
    fn parse_copy_flags_rejected() {
        assert!(parse_recipe("base", "COPY --chown=app a b").is_err());
    }

    #[test]
    fn parse_env_both_forms() {
        let input = "ENV OPTIMADE_CONFIG_FILE /app/optimade_config.json\nENV A=1 B=\"x y\"";
        let steps = parse_recipe("generic", input).expect("should parse");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].target, "OPTIMADE_CONFIG_FILE");
        assert_eq!(steps[0].source.as_deref(), Some("/app/optimade_config.json"));
        assert_eq!(steps[2].target, "B");
        assert_eq!(steps[2].source.as_deref(), Some("x y"));
        assert_eq!(steps[2].origin.line, 2);
    }

    #[test]
    fn parse_env_space_form_unquotes_single_word() {
        let input = "ENV GREETING \"hello world\"\nENV PAIR \"a b\" c\nENV PLAIN /app/x";
        let steps = parse_recipe("base", input).expect("should parse");
        assert_eq!(steps[0].source.as_deref(), Some("hello world"));
        assert_eq!(steps[1].source.as_deref(), Some("\"a b\" c"));
        assert_eq!(steps[2].source.as_deref(), Some("/app/x"));
    }

    #[test]
    fn parse_env_space_form_unterminated_quote_fails() {
        let err = parse_recipe("base", "ENV GREETING \"hello").unwrap_err();
        assert!(err.to_string().contains("unterminated"), "got: {err}");
    }

    #[test]
    fn parse_arg_forms() {
        let input = "ARG CONFIG_FILE\nARG PORT=5000\nARG MODE production";
        let steps = parse_recipe("base", input).expect("should parse");
        assert_eq!(steps[0].source, None);
        assert_eq!(steps[1].source.as_deref(), Some("5000"));
        assert_eq!(steps[2].target, "MODE");
        assert_eq!(steps[2].source.as_deref(), Some("production"));
    }

    #[test]
    fn parse_expose_several_ports() {
        let steps = parse_recipe("base", "EXPOSE 5000 8080/tcp ${PORT}").expect("should parse");
        let ports: Vec<&str> = steps.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(ports, vec!["5000", "8080", "${PORT}"]);
    }

    #[test]
    fn parse_entrypoint_forms() {
        let shell = parse_recipe("base", "ENTRYPOINT /app/run.sh").expect("should parse");
        let exec = parse_recipe("base", r#"ENTRYPOINT ["/app/run.sh"]"#).expect("should parse");
        assert_eq!(shell[0].target, "/app/run.sh");
        assert_eq!(shell[0].target, exec[0].target);
    }

    #[test]
    fn parse_entrypoint_with_arguments_rejected() {
        let err = parse_recipe("base", r#"ENTRYPOINT ["/app/run.sh", "--debug"]"#).unwrap_err();
        assert!(err.to_string().contains("exactly one path"), "got: {err}");
    }

    #[test]
    fn parse_keywords_case_insensitive() {
        let steps = parse_recipe("base", "from python:3.10\nworkdir /app").expect("should parse");
        assert_eq!(steps[0].kind, StepKind::From);
        assert_eq!(steps[1].kind, StepKind::Workdir);
    }

    #[test]
    fn parse_unknown_instruction_fails() {
        let err = parse_recipe("mcloud", "EXPOSE 5000\nCMD [\"x\"]").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("mcloud:2"), "got: {msg}");
        assert!(msg.contains("unknown instruction: CMD"), "got: {msg}");
    }

    #[test]
    fn parse_instruction_without_arguments_fails() {
        assert!(parse_recipe("base", "WORKDIR").is_err());
    }

    #[test]
    fn parse_run_keeps_command_text() {
        let steps =
            parse_recipe("base", "RUN pip install \\\n  -e .[server]").expect("should parse");
        assert_eq!(steps[0].target, "pip install -e .[server]");
        assert_eq!(steps[0].source.as_deref(), Some("pip install -e .[server]"));
    }

    #[test]
    fn basename_strips_directories() {
        assert_eq!(basename("providers/src/links/v1/providers.json"), "providers.json");
        assert_eq!(basename("optimade/"), "optimade");
        assert_eq!(basename("run.sh"), "run.sh");
    }
}
