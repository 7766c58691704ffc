//! Multiple-Choice Problem Generation
//!
//! Builds a generation prompt from the caller's parameters, asks the completion
//! model for a problem, and validates the JSON it returns before handing back a
//! normalized problem with generation metadata.

use crate::{
    llm_client::{CompletionClient, CompletionRequest},
    problem_shape::{self, GeneratedProblem, ProblemShapeError},
    prompts,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error, info};
use utoipa::ToSchema;

pub const DEFAULT_NUM_OPTIONS: u32 = 4;
pub const MIN_NUM_OPTIONS: u32 = 2;
pub const MAX_NUM_OPTIONS: u32 = 6;
pub const MAX_RECENT_PROBLEMS: usize = 5;
pub const RECENT_PROBLEM_CHARS: usize = 200;
const GENERATION_MAX_TOKENS: u32 = 2048;
const GENERATION_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[default]
    College,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::College => "college",
        }
    }

    fn guide(self) -> &'static str {
        match self {
            Difficulty::Easy => {
                "High school level. Clear language, straightforward concepts, obvious wrong answers."
            }
            Difficulty::Medium => "Undergraduate level. Standard terminology, plausible distractors.",
            Difficulty::Hard => {
                "Graduate level. Technical terminology, subtle distractors, deep understanding required."
            }
            Difficulty::College => "College level. Academic language, tests conceptual understanding.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConceptualDepth {
    Surface,
    #[default]
    Intermediate,
    Deep,
}

impl ConceptualDepth {
    fn guide(self) -> &'static str {
        match self {
            ConceptualDepth::Surface => "Focus on definitions and basic recall.",
            ConceptualDepth::Intermediate => {
                "Focus on understanding relationships and applying knowledge."
            }
            ConceptualDepth::Deep => "Focus on analysis, synthesis, and complex problem-solving.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProblemStyle {
    Theoretical,
    Applied,
    #[default]
    Mixed,
}

impl ProblemStyle {
    fn guide(self) -> &'static str {
        match self {
            ProblemStyle::Theoretical => {
                "Focus on conceptual understanding and theoretical principles."
            }
            ProblemStyle::Applied => "Focus on real-world applications and practical scenarios.",
            ProblemStyle::Mixed => "Balance theoretical understanding with practical applications.",
        }
    }
}

/// Parameters accepted by the problem generator.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    #[schema(example = "Cell biology")]
    pub topic: String,
    /// Question texts to steer away from.
    pub recent_problems: Vec<String>,
    pub prefer_multi_part: bool,
    pub difficulty: Difficulty,
    /// Clamped to 2..=6; missing or zero means 4.
    pub num_options: Option<i64>,
    pub include_visuals: bool,
    pub conceptual_depth: ConceptualDepth,
    pub problem_style: ProblemStyle,
}

impl GenerationRequest {
    pub fn option_count(&self) -> u32 {
        match self.num_options {
            None | Some(0) => DEFAULT_NUM_OPTIONS,
            Some(n) => n.clamp(MIN_NUM_OPTIONS as i64, MAX_NUM_OPTIONS as i64) as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub difficulty: Difficulty,
    pub conceptual_depth: ConceptualDepth,
    pub problem_style: ProblemStyle,
    pub has_visual: bool,
    pub generated_at: DateTime<Utc>,
}

/// A validated problem together with how it was generated.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GeneratedProblemResponse {
    #[serde(flatten)]
    pub problem: GeneratedProblem,
    pub metadata: GenerationMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Topic is required")]
    MissingTopic,
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
    #[error("Failed to parse response as JSON")]
    MalformedJson,
    #[error("Invalid problem structure: {0}")]
    InvalidStructure(ProblemShapeError),
}

/// Renders the generation prompt for `request`.
pub fn build_prompt(prompts: &HashMap<String, String>, request: &GenerationRequest) -> anyhow::Result<String> {
    let topic = request.topic.trim();
    let num_options = request.option_count();

    prompts::render(
        prompts,
        prompts::GENERATE_PROBLEM,
        &[
            ("topic", topic),
            ("difficulty", request.difficulty.as_str()),
            ("difficulty_guide", request.difficulty.guide()),
            ("depth_guide", request.conceptual_depth.guide()),
            ("style_guide", request.problem_style.guide()),
            ("num_options", &num_options.to_string()),
            ("visual_instructions", &visual_instructions(request.include_visuals)),
            ("avoid_section", &avoid_section(topic, &request.recent_problems)),
            ("structure_example", &structure_example(topic, num_options, request.prefer_multi_part)),
        ],
    )
}

fn visual_instructions(include_visuals: bool) -> String {
    if !include_visuals {
        return String::new();
    }
    r#"
Include a "visual" field when appropriate:
{
  "visual": {
    "type": "equation|code|table|diagram",
    "content": "The actual content (LaTeX for equations, code for programming, etc.)",
    "description": "What this visual represents"
  }
}
- For math: Use LaTeX (e.g., "\\frac{d}{dx}(x^2) = 2x")
- For code: Use the appropriate language
- For tables: Use markdown table format
"#
    .to_string()
}

fn structure_example(topic: &str, num_options: u32, multi_part: bool) -> String {
    if multi_part {
        let options = vec!["\"Option\""; num_options as usize].join(", ");
        format!(
            r#"{{
  "question": "Consider the following scenario about {topic}:",
  "parts": [
    {{
      "prompt": "Part A: First aspect of the problem",
      "options": [{options}],
      "correct_answer": "The exact text of the correct option",
      "explanation": "Why this is correct"
    }},
    {{
      "prompt": "Part B: Second aspect",
      "options": [{options}],
      "correct_answer": "The exact text of the correct option",
      "explanation": "Why this is correct"
    }}
  ],
  "tags": ["concept1", "concept2"]
}}"#
        )
    } else {
        let options = vec!["\"Distinct option\""; num_options as usize].join(", ");
        format!(
            r#"{{
  "question": "A clear, specific question about {topic}",
  "options": [{options}],
  "correct_answer": "Must exactly match one option above",
  "explanation": "2-3 sentences explaining why this is correct",
  "tags": ["concept1", "concept2"]
}}"#
        )
    }
}

fn avoid_section(topic: &str, recent_problems: &[String]) -> String {
    if recent_problems.is_empty() {
        return String::new();
    }
    let mut section = String::from("\n\nAVOID these recently asked concepts:\n");
    for (i, problem) in recent_problems.iter().take(MAX_RECENT_PROBLEMS).enumerate() {
        let excerpt: String = problem.chars().take(RECENT_PROBLEM_CHARS).collect();
        section.push_str(&format!("{}. {}...\n", i + 1, excerpt));
    }
    section.push_str(&format!(
        "\nGenerate a question testing a DIFFERENT aspect of {topic}."
    ));
    section
}

/// Generates and validates multiple-choice problems with a completion model.
pub struct ProblemGenerator {
    client: Arc<dyn CompletionClient>,
    prompts: Arc<HashMap<String, String>>,
}

impl ProblemGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, prompts: Arc<HashMap<String, String>>) -> Self {
        Self { client, prompts }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedProblemResponse, GenerationError> {
        if request.topic.trim().is_empty() {
            return Err(GenerationError::MissingTopic);
        }

        let prompt = build_prompt(&self.prompts, request)?;
        info!(topic = %request.topic.trim(), "Generating problem");

        let completion = self
            .client
            .complete(
                CompletionRequest::new(prompt, GENERATION_MAX_TOKENS)
                    .with_temperature(GENERATION_TEMPERATURE),
            )
            .await?;
        let preview: String = completion.text.chars().take(500).collect();
        debug!(response = %preview, "Raw completion");

        let data = problem_shape::extract_json_object(&completion.text).map_err(|e| {
            error!(error = %e, content = %completion.text, "JSON parse error");
            GenerationError::MalformedJson
        })?;

        let problem = problem_shape::normalize_problem(&data).map_err(|e| {
            error!(error = %e, problem = %data, "Validation failed");
            GenerationError::InvalidStructure(e)
        })?;

        let metadata = GenerationMetadata {
            difficulty: request.difficulty,
            conceptual_depth: request.conceptual_depth,
            problem_style: request.problem_style,
            has_visual: problem.has_visual(),
            generated_at: Utc::now(),
        };

        info!("Successfully generated problem");
        Ok(GeneratedProblemResponse { problem, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{Completion, MockCompletionClient};

    fn prompts() -> Arc<HashMap<String, String>> {
        let mut prompts = HashMap::new();
        prompts.insert(
            prompts::GENERATE_PROBLEM.to_string(),
            "Topic: {topic}\nDifficulty: {difficulty} ({difficulty_guide})\nDepth: {depth_guide}\nStyle: {style_guide}\nOptions: {num_options}\n{visual_instructions}\n{structure_example}{avoid_section}".to_string(),
        );
        Arc::new(prompts)
    }

    fn request(topic: &str) -> GenerationRequest {
        GenerationRequest {
            topic: topic.to_string(),
            ..Default::default()
        }
    }

    fn replying(text: &'static str) -> Arc<dyn CompletionClient> {
        let mut client = MockCompletionClient::new();
        client.expect_complete().times(1).returning(move |req| {
            assert_eq!(req.max_tokens, 2048);
            assert_eq!(req.temperature, Some(0.7));
            Ok(Completion {
                text: text.to_string(),
                model: "mock".to_string(),
                stop_reason: None,
            })
        });
        Arc::new(client)
    }

    #[test]
    fn test_option_count_clamps() {
        let mut req = request("x");
        assert_eq!(req.option_count(), 4);
        req.num_options = Some(0);
        assert_eq!(req.option_count(), 4);
        req.num_options = Some(1);
        assert_eq!(req.option_count(), 2);
        req.num_options = Some(-3);
        assert_eq!(req.option_count(), 2);
        req.num_options = Some(9);
        assert_eq!(req.option_count(), 6);
        req.num_options = Some(5);
        assert_eq!(req.option_count(), 5);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: GenerationRequest = serde_json::from_str(r#"{"topic": "Optics"}"#).unwrap();
        assert_eq!(req.difficulty, Difficulty::College);
        assert_eq!(req.conceptual_depth, ConceptualDepth::Intermediate);
        assert_eq!(req.problem_style, ProblemStyle::Mixed);
        assert!(!req.prefer_multi_part);

        let req: GenerationRequest = serde_json::from_str(
            r#"{"topic": "Optics", "difficulty": "hard", "conceptualDepth": "deep", "problemStyle": "applied", "numOptions": 3, "preferMultiPart": true}"#,
        )
        .unwrap();
        assert_eq!(req.difficulty, Difficulty::Hard);
        assert_eq!(req.conceptual_depth, ConceptualDepth::Deep);
        assert_eq!(req.problem_style, ProblemStyle::Applied);
        assert_eq!(req.option_count(), 3);
        assert!(req.prefer_multi_part);
    }

    #[test]
    fn test_prompt_single_part() {
        let prompt = build_prompt(&prompts(), &request("  Thermodynamics ")).unwrap();

        assert!(prompt.contains("Topic: Thermodynamics\n"));
        assert!(prompt.contains("Difficulty: college (College level."));
        assert!(prompt.contains("Options: 4"));
        assert!(prompt.contains("A clear, specific question about Thermodynamics"));
        assert_eq!(prompt.matches("\"Distinct option\"").count(), 4);
        assert!(!prompt.contains("\"parts\""));
        assert!(!prompt.contains("\"visual\""));
        assert!(!prompt.contains("AVOID"));
    }

    #[test]
    fn test_prompt_multi_part_with_visuals() {
        let mut req = request("Calculus");
        req.prefer_multi_part = true;
        req.include_visuals = true;
        req.num_options = Some(3);
        let prompt = build_prompt(&prompts(), &req).unwrap();

        assert!(prompt.contains("\"parts\""));
        assert_eq!(prompt.matches("\"Option\"").count(), 6);
        assert!(prompt.contains("Include a \"visual\" field"));
    }

    #[test]
    fn test_prompt_lists_at_most_five_recent_problems() {
        let mut req = request("Genetics");
        req.recent_problems = (1..=7).map(|i| format!("Question {i}")).collect();
        req.recent_problems[0] = "x".repeat(300);
        let prompt = build_prompt(&prompts(), &req).unwrap();

        assert!(prompt.contains("AVOID these recently asked concepts:"));
        assert!(prompt.contains(&format!("1. {}...", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
        assert!(prompt.contains("5. Question 5..."));
        assert!(!prompt.contains("Question 6"));
        assert!(prompt.contains("DIFFERENT aspect of Genetics"));
    }

    #[tokio::test]
    async fn test_generate_rejects_blank_topic() {
        let generator = ProblemGenerator::new(Arc::new(MockCompletionClient::new()), prompts());
        let err = generator.generate(&request("   ")).await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingTopic));
    }

    #[tokio::test]
    async fn test_generate_normalizes_fenced_response() {
        let client = replying(
            "```json\n{\"question\": \"Capital of France?\", \"options\": [\"Paris\", \"London\", \"Berlin\"], \"correct_answer\": \"paris \", \"visual\": {\"type\": \"table\", \"content\": \"|a|\"}}\n```",
        );
        let generator = ProblemGenerator::new(client, prompts());

        let mut req = request("Geography");
        req.difficulty = Difficulty::Easy;
        let response = generator.generate(&req).await.unwrap();

        let GeneratedProblem::SinglePart(problem) = &response.problem else {
            panic!("expected single-part problem");
        };
        assert_eq!(problem.correct_answer, "Paris");
        assert_eq!(response.metadata.difficulty, Difficulty::Easy);
        assert!(response.metadata.has_visual);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["question"], "Capital of France?");
        assert_eq!(json["metadata"]["difficulty"], "easy");
        assert_eq!(json["metadata"]["conceptualDepth"], "intermediate");
        assert_eq!(json["metadata"]["problemStyle"], "mixed");
        assert_eq!(json["metadata"]["hasVisual"], true);
        assert!(json["metadata"]["generatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_generate_fails_on_malformed_json() {
        let generator = ProblemGenerator::new(replying("Sorry, I cannot help with that."), prompts());
        let err = generator.generate(&request("Anything")).await.unwrap_err();
        assert!(matches!(err, GenerationError::MalformedJson));
        assert_eq!(err.to_string(), "Failed to parse response as JSON");
    }

    #[tokio::test]
    async fn test_generate_fails_on_invalid_structure() {
        let generator = ProblemGenerator::new(
            replying(r#"{"question": "Q?", "options": ["only one"]}"#),
            prompts(),
        );
        let err = generator.generate(&request("Anything")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid problem structure: Must have at least 2 options"
        );
    }

    #[tokio::test]
    async fn test_generate_propagates_upstream_error() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .returning(|_| Err(anyhow::anyhow!("Claude API error: 529 overloaded")));
        let generator = ProblemGenerator::new(Arc::new(client), prompts());

        let err = generator.generate(&request("Anything")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Upstream(_)));
        assert!(err.to_string().contains("529"));
    }
}
