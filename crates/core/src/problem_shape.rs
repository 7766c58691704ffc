//! Generated Problem Shapes
//!
//! Model output describing a multiple-choice problem arrives as loosely shaped
//! JSON. This module extracts the JSON object from the raw completion text,
//! decides which problem shape it is, and normalizes it into typed values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

pub const DEFAULT_EXPLANATION: &str = "No explanation provided.";
pub const MIN_OPTIONS: usize = 2;

/// Structural problems found in model output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProblemShapeError {
    #[error("Failed to parse response as JSON: {0}")]
    MalformedJson(String),
    #[error("Response is not an object")]
    NotAnObject,
    #[error("Missing question/options or parts array")]
    UnknownShape,
    #[error("Must have at least 2 options")]
    TooFewOptions,
    #[error("Part {0} must have at least 2 options")]
    PartTooFewOptions(usize),
}

/// Optional supporting material attached to a problem or part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Visual {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SinglePartProblem {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<Visual>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProblemPart {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<Visual>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MultiPartProblem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub parts: Vec<ProblemPart>,
    pub tags: Vec<String>,
}

/// A normalized problem in one of the two shapes a model may return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum GeneratedProblem {
    MultiPart(MultiPartProblem),
    SinglePart(SinglePartProblem),
}

impl GeneratedProblem {
    /// True when the problem or any of its parts carries a visual.
    pub fn has_visual(&self) -> bool {
        match self {
            GeneratedProblem::SinglePart(p) => p.visual.is_some(),
            GeneratedProblem::MultiPart(p) => p.parts.iter().any(|part| part.visual.is_some()),
        }
    }
}

/// Which rule produced the resolved correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMatch {
    /// Case-insensitive equality with an option.
    Exact,
    /// One of the two texts contains the other.
    Partial,
    /// Nothing matched; the first option was used.
    Fallback,
}

/// The option text chosen as the correct answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnswer {
    pub text: String,
    pub matched: AnswerMatch,
}

/// Reconciles a model's `correct_answer` with the option list.
///
/// Tries exact case-insensitive equality, then containment in either
/// direction, then the first option. `options` must not be empty.
pub fn resolve_correct_answer(options: &[String], raw_answer: &str) -> ResolvedAnswer {
    let answer = raw_answer.trim().to_lowercase();

    if let Some(option) = options.iter().find(|opt| opt.to_lowercase() == answer) {
        return ResolvedAnswer {
            text: option.clone(),
            matched: AnswerMatch::Exact,
        };
    }

    if let Some(option) = options.iter().find(|opt| {
        let lowered = opt.to_lowercase();
        lowered.contains(&answer) || answer.contains(&lowered)
    }) {
        return ResolvedAnswer {
            text: option.clone(),
            matched: AnswerMatch::Partial,
        };
    }

    ResolvedAnswer {
        text: options.first().cloned().unwrap_or_default(),
        matched: AnswerMatch::Fallback,
    }
}

/// Pulls the JSON object out of a completion that may be wrapped in a
/// Markdown code fence or surrounded by prose.
pub fn extract_json_object(content: &str) -> Result<Value, ProblemShapeError> {
    let mut cleaned = strip_code_fence(content.trim()).trim();

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            cleaned = &cleaned[start..=end];
        }
    }

    serde_json::from_str(cleaned).map_err(|e| ProblemShapeError::MalformedJson(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let mut text = text;
    if let Some(rest) = text.strip_prefix("```") {
        let rest = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

/// Decides the problem shape and normalizes it.
///
/// A non-empty `parts` array makes a multi-part problem; otherwise a non-empty
/// `question` together with an `options` array makes a single-part problem.
pub fn normalize_problem(data: &Value) -> Result<GeneratedProblem, ProblemShapeError> {
    let object = data.as_object().ok_or(ProblemShapeError::NotAnObject)?;

    if let Some(parts) = object.get("parts").and_then(Value::as_array) {
        if !parts.is_empty() {
            return normalize_multi_part(object, parts).map(GeneratedProblem::MultiPart);
        }
    }

    let has_question = object.get("question").is_some_and(is_truthy);
    let has_options = object.get("options").is_some_and(Value::is_array);
    if has_question && has_options {
        return normalize_single_part(object).map(GeneratedProblem::SinglePart);
    }

    Err(ProblemShapeError::UnknownShape)
}

fn normalize_single_part(object: &Map<String, Value>) -> Result<SinglePartProblem, ProblemShapeError> {
    let options = normalize_options(object.get("options"));
    if options.len() < MIN_OPTIONS {
        return Err(ProblemShapeError::TooFewOptions);
    }

    let resolved = resolve_correct_answer(&options, &field_text(object, "correct_answer"));
    if resolved.matched == AnswerMatch::Fallback {
        tracing::warn!("correct_answer not found in options, defaulting to first option");
    }

    Ok(SinglePartProblem {
        question: field_text(object, "question"),
        options,
        correct_answer: resolved.text,
        explanation: explanation(object),
        tags: tags(object),
        visual: visual(object),
    })
}

fn normalize_multi_part(
    object: &Map<String, Value>,
    parts: &[Value],
) -> Result<MultiPartProblem, ProblemShapeError> {
    let empty = Map::new();
    let parts = parts
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let part = part.as_object().unwrap_or(&empty);
            let options = normalize_options(part.get("options"));
            if options.len() < MIN_OPTIONS {
                return Err(ProblemShapeError::PartTooFewOptions(index + 1));
            }

            let resolved = resolve_correct_answer(&options, &field_text(part, "correct_answer"));
            if resolved.matched == AnswerMatch::Fallback {
                tracing::warn!(part = index + 1, "correct_answer not found in options, defaulting to first option");
            }

            Ok(ProblemPart {
                prompt: field_text(part, "prompt"),
                options,
                correct_answer: resolved.text,
                explanation: explanation(part),
                visual: visual(part),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let question = object
        .get("question")
        .filter(|v| is_truthy(v))
        .map(|v| value_text(v).trim().to_string());

    Ok(MultiPartProblem {
        question,
        parts,
        tags: tags(object),
    })
}

fn normalize_options(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| value_text(item).trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn explanation(object: &Map<String, Value>) -> String {
    match object.get("explanation").filter(|v| is_truthy(v)) {
        Some(v) => value_text(v).trim().to_string(),
        None => DEFAULT_EXPLANATION.to_string(),
    }
}

fn tags(object: &Map<String, Value>) -> Vec<String> {
    object
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(value_text).collect())
        .unwrap_or_default()
}

fn visual(object: &Map<String, Value>) -> Option<Visual> {
    object
        .get("visual")
        .filter(|v| is_truthy(v))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Reads a field as trimmed text, treating missing and falsy values as empty.
fn field_text(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .filter(|v| is_truthy(v))
        .map(|v| value_text(v).trim().to_string())
        .unwrap_or_default()
}

/// Renders a scalar the way it would be printed: strings without quotes.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_exact_ignores_case_and_whitespace() {
        let resolved = resolve_correct_answer(&options(&["Paris", "London", "Berlin"]), "paris ");
        assert_eq!(resolved.text, "Paris");
        assert_eq!(resolved.matched, AnswerMatch::Exact);
    }

    #[test]
    fn test_resolve_partial_either_direction() {
        let opts = options(&["The mitochondria", "The nucleus", "The ribosome"]);

        let contained = resolve_correct_answer(&opts, "nucleus");
        assert_eq!(contained.text, "The nucleus");
        assert_eq!(contained.matched, AnswerMatch::Partial);

        let containing = resolve_correct_answer(&opts, "B) The ribosome of the cell");
        assert_eq!(containing.text, "The ribosome");
        assert_eq!(containing.matched, AnswerMatch::Partial);
    }

    #[test]
    fn test_resolve_exact_wins_over_earlier_partial() {
        let resolved = resolve_correct_answer(&options(&["Paris, France", "Paris"]), "Paris");
        assert_eq!(resolved.text, "Paris");
        assert_eq!(resolved.matched, AnswerMatch::Exact);
    }

    #[test]
    fn test_resolve_falls_back_to_first_option() {
        let resolved = resolve_correct_answer(&options(&["Red", "Green", "Blue"]), "Purple");
        assert_eq!(resolved.text, "Red");
        assert_eq!(resolved.matched, AnswerMatch::Fallback);
    }

    #[test]
    fn test_resolve_empty_answer_matches_first_option_partially() {
        let resolved = resolve_correct_answer(&options(&["Red", "Green"]), "");
        assert_eq!(resolved.text, "Red");
        assert_eq!(resolved.matched, AnswerMatch::Partial);
    }

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json_object(r#"{"question": "Q?"}"#).unwrap();
        assert_eq!(value["question"], "Q?");
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "```json\n{\"question\": \"Q?\", \"options\": [\"a\", \"b\"]}\n```";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["options"][1], "b");

        let upper = "```JSON\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(upper).unwrap()["a"], 1);

        let bare = "```\n{\"a\": 2}\n```";
        assert_eq!(extract_json_object(bare).unwrap()["a"], 2);
    }

    #[test]
    fn test_extract_json_surrounded_by_prose() {
        let text = "Here is your problem:\n{\"a\": {\"b\": 3}}\nGood luck!";
        assert_eq!(extract_json_object(text).unwrap()["a"]["b"], 3);
    }

    #[test]
    fn test_extract_malformed_json_fails() {
        let err = extract_json_object("```json\n{\"question\": \"unterminated}\n```").unwrap_err();
        assert!(matches!(err, ProblemShapeError::MalformedJson(_)));

        let err = extract_json_object("no json at all").unwrap_err();
        assert!(matches!(err, ProblemShapeError::MalformedJson(_)));
    }

    #[test]
    fn test_normalize_single_part() {
        let data = json!({
            "question": "  Capital of France?  ",
            "options": ["Paris", " London ", "", 42],
            "correct_answer": "paris ",
            "tags": ["geography", 1]
        });

        let problem = normalize_problem(&data).unwrap();
        let GeneratedProblem::SinglePart(problem) = problem else {
            panic!("expected single-part problem");
        };
        assert_eq!(problem.question, "Capital of France?");
        assert_eq!(problem.options, vec!["Paris", "London", "42"]);
        assert_eq!(problem.correct_answer, "Paris");
        assert_eq!(problem.explanation, DEFAULT_EXPLANATION);
        assert_eq!(problem.tags, vec!["geography", "1"]);
        assert!(problem.visual.is_none());
    }

    #[test]
    fn test_normalize_multi_part_wins_when_both_shapes_present() {
        let data = json!({
            "question": "Scenario",
            "options": ["x", "y"],
            "parts": [
                {
                    "prompt": "Part A",
                    "options": ["1", "2", "3"],
                    "correct_answer": "2",
                    "explanation": "Because.",
                    "visual": {"type": "equation", "content": "x^2"}
                },
                {
                    "prompt": "Part B",
                    "options": ["yes", "no"],
                    "correct_answer": "maybe"
                }
            ]
        });

        let problem = normalize_problem(&data).unwrap();
        assert!(problem.has_visual());
        let GeneratedProblem::MultiPart(problem) = problem else {
            panic!("expected multi-part problem");
        };
        assert_eq!(problem.question.as_deref(), Some("Scenario"));
        assert_eq!(problem.parts.len(), 2);
        assert_eq!(problem.parts[0].correct_answer, "2");
        assert_eq!(problem.parts[0].visual.as_ref().unwrap().kind, "equation");
        assert_eq!(problem.parts[1].correct_answer, "yes");
        assert_eq!(problem.parts[1].explanation, DEFAULT_EXPLANATION);
    }

    #[test]
    fn test_normalize_rejects_unknown_shape() {
        assert_eq!(
            normalize_problem(&json!({"question": "Q?"})),
            Err(ProblemShapeError::UnknownShape)
        );
        assert_eq!(
            normalize_problem(&json!({"options": ["a", "b"]})),
            Err(ProblemShapeError::UnknownShape)
        );
        assert_eq!(
            normalize_problem(&json!({"parts": [], "question": ""})),
            Err(ProblemShapeError::UnknownShape)
        );
        assert_eq!(normalize_problem(&json!([1, 2])), Err(ProblemShapeError::NotAnObject));
    }

    #[test]
    fn test_normalize_requires_two_options() {
        let single = json!({"question": "Q?", "options": ["only", "  "]});
        assert_eq!(normalize_problem(&single), Err(ProblemShapeError::TooFewOptions));

        let multi = json!({"parts": [
            {"prompt": "A", "options": ["a", "b"], "correct_answer": "a"},
            {"prompt": "B", "options": ["a"], "correct_answer": "a"}
        ]});
        let err = normalize_problem(&multi).unwrap_err();
        assert_eq!(err, ProblemShapeError::PartTooFewOptions(2));
        assert_eq!(err.to_string(), "Part 2 must have at least 2 options");
    }

    #[test]
    fn test_malformed_visual_is_dropped() {
        let data = json!({
            "question": "Q?",
            "options": ["a", "b"],
            "correct_answer": "a",
            "visual": {"kind": "nope"}
        });
        let problem = normalize_problem(&data).unwrap();
        assert!(!problem.has_visual());
    }

    #[test]
    fn test_single_part_serializes_without_visual_field() {
        let problem = normalize_problem(&json!({
            "question": "Q?",
            "options": ["a", "b"],
            "correct_answer": "b"
        }))
        .unwrap();
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["correct_answer"], "b");
        assert!(json.get("visual").is_none());
        assert!(json.get("parts").is_none());
    }
}
