//! Reconciled recipe output.

use std::collections::BTreeSet;
use std::fmt::Write;

use vresolve_common::constants::BIN_NAME;

use crate::linearize::ResolvedPlan;

/// Renders a resolved plan as recipe text, one instruction per step.
///
/// The header lists every definition that contributed a step, in order of
/// first appearance.
#[must_use]
pub fn render(plan: &ResolvedPlan) -> String {
    let mut seen = BTreeSet::new();
    let definitions: Vec<&str> = plan
        .steps
        .iter()
        .map(|s| s.origin.definition.as_str())
        .filter(|d| seen.insert(*d))
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "# Generated by {BIN_NAME} from: {}", definitions.join(", "));
    for step in &plan.steps {
        let _ = writeln!(out, "{}", step.to_instruction());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linearize::linearize;
    use vresolve_recipe::parser::parse_recipe;
    use vresolve_recipe::{Origin, Step, StepKind};

    #[test]
    fn renders_one_line_per_step() {
        let steps = vec![
            Step::new(StepKind::From, "python:3.10-slim", "python:3.10-slim", Origin::new("base", 1)),
            Step::new(StepKind::Expose, "5000", "5000", Origin::new("base", 2)),
            Step::new(StepKind::Expose, "5000", "5000", Origin::new("mcloud", 1)),
            Step::new(StepKind::Env, "OPTIMADE_INDEX_LINKS_PATH", "/app/index_links.json", Origin::new("mcloud", 2)),
            Step::new(StepKind::Entrypoint, "/app/run.sh", "/app/run.sh", Origin::new("base", 3)),
        ];
        let plan = linearize(steps).expect("linearize");
        let text = render(&plan);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# Generated by vresolve from: base, mcloud",
                "FROM python:3.10-slim",
                "ENV OPTIMADE_INDEX_LINKS_PATH=/app/index_links.json",
                "EXPOSE 5000",
                "ENTRYPOINT [\"/app/run.sh\"]",
            ]
        );
    }

    #[test]
    fn rendered_recipe_parses_back_to_the_plan() {
        let recipe = r#"
WORKDIR "/srv/my app"
COPY ["my file.json", "/app/"]
ENV GREETING="hello world" QUOTE="say \"hi\""
ARG MODE="fast mode"
RUN cp "/app/my file.json" /app/config.json
EXPOSE 5000
ENTRYPOINT ["/app/run.sh"]
"#;
        let steps = parse_recipe("base", recipe).expect("should parse recipe");
        let plan = linearize(steps).expect("linearize");
        let reparsed = parse_recipe("rendered", &render(&plan)).expect("rendered text should parse");

        let shape = |steps: &[Step]| -> Vec<(StepKind, String, Option<String>)> {
            steps
                .iter()
                .map(|s| (s.kind, s.target.clone(), s.source.clone()))
                .collect()
        };
        assert_eq!(shape(&reparsed), shape(&plan.steps));
        assert!(reparsed.iter().any(|s| s.target == "/app/my file.json"));
    }

    #[test]
    fn rendered_text_has_no_merge_markers() {
        let steps = vec![Step::new(StepKind::Entrypoint, "/app/run.sh", "/app/run.sh", Origin::new("base", 1))];
        let text = render(&linearize(steps).expect("linearize"));
        assert!(!text.contains("<<<<<<<"));
        assert!(!text.contains(">>>>>>>"));
    }
}
