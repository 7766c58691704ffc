//! Prompt templates are Markdown files keyed by file stem, with `{name}`
//! placeholders filled in at request time.

use anyhow::{Context, Result};
use std::collections::HashMap;

pub const GENERATE_PROBLEM: &str = "generate_problem";
pub const SOLVE_MATH: &str = "solve_math";
pub const SOLVE_MATH_SYSTEM: &str = "solve_math_system";
pub const EXTRACT_TOPICS: &str = "extract_topics";

/// Looks up `key` and substitutes every `{name}` placeholder in `vars`.
///
/// Substitution is a single pass over the template, so placeholder syntax
/// inside a substituted value is copied through verbatim.
pub fn render(prompts: &HashMap<String, String>, key: &str, vars: &[(&str, &str)]) -> Result<String> {
    let template = prompts
        .get(key)
        .with_context(|| format!("Missing prompt template: '{}'", key))?;

    let mut text = String::with_capacity(template.len());
    let mut rest = template.as_str();
    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                text.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                text.push('{');
                rest = after;
            }
        }
    }
    text.push_str(rest);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_every_occurrence() {
        let mut prompts = HashMap::new();
        prompts.insert("greet".to_string(), "Hi {name}, {name}! Topic: {topic}".to_string());

        let text = render(&prompts, "greet", &[("name", "Ada"), ("topic", "Graphs")]).unwrap();
        assert_eq!(text, "Hi Ada, Ada! Topic: Graphs");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let mut prompts = HashMap::new();
        prompts.insert("t".to_string(), "{known} {unknown}".to_string());
        assert_eq!(render(&prompts, "t", &[("known", "x")]).unwrap(), "x {unknown}");
    }

    #[test]
    fn test_render_does_not_expand_placeholders_inside_values() {
        let mut prompts = HashMap::new();
        prompts.insert(
            "t".to_string(),
            "Topic: {topic}\nOptions: {num_options}\n{avoid_section}".to_string(),
        );

        let text = render(
            &prompts,
            "t",
            &[
                ("topic", "Sets {num_options} {avoid_section}"),
                ("num_options", "4"),
                ("avoid_section", "none"),
            ],
        )
        .unwrap();
        assert_eq!(text, "Topic: Sets {num_options} {avoid_section}\nOptions: 4\nnone");
    }

    #[test]
    fn test_render_keeps_stray_braces() {
        let mut prompts = HashMap::new();
        prompts.insert("t".to_string(), r#"{"question": "{q}"} {"#.to_string());
        assert_eq!(
            render(&prompts, "t", &[("q", "Why?")]).unwrap(),
            r#"{"question": "Why?"} {"#
        );
    }

    #[test]
    fn test_render_missing_template() {
        let err = render(&HashMap::new(), GENERATE_PROBLEM, &[]).unwrap_err();
        assert!(err.to_string().contains("generate_problem"));
    }
}
