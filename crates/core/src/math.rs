//! Step-by-step math solving through the completion model.

use crate::{
    llm_client::{CompletionClient, CompletionRequest},
    problem_shape, prompts,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};
use utoipa::ToSchema;

const SOLVE_MAX_TOKENS: u32 = 2048;
pub const FALLBACK_ANSWER: &str = "See explanation";

fn default_show_steps() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MathRequest {
    #[serde(default)]
    #[schema(example = "Solve 2x + 3 = 11")]
    pub problem: String,
    #[serde(default = "default_show_steps")]
    pub show_steps: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SolutionStep {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MathSolution {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub steps: Vec<SolutionStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub formulas: Vec<String>,
}

impl MathSolution {
    fn from_raw_text(text: &str) -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            steps: Vec::new(),
            explanation: Some(text.to_string()),
            concepts: Vec::new(),
            formulas: Vec::new(),
        }
    }
}

/// Parses the model's reply, degrading to the raw text as the explanation when
/// it is not a JSON object of the expected shape.
pub fn parse_solution(text: &str) -> MathSolution {
    problem_shape::extract_json_object(text)
        .ok()
        .and_then(|value| serde_json::from_value::<MathSolution>(value).ok())
        .unwrap_or_else(|| {
            warn!("Math solution was not valid JSON; returning raw text");
            MathSolution::from_raw_text(text)
        })
}

#[derive(Debug, thiserror::Error)]
pub enum MathError {
    #[error("Problem statement is required")]
    MissingProblem,
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

pub struct MathSolver {
    client: Arc<dyn CompletionClient>,
    prompts: Arc<HashMap<String, String>>,
}

impl MathSolver {
    pub fn new(client: Arc<dyn CompletionClient>, prompts: Arc<HashMap<String, String>>) -> Self {
        Self { client, prompts }
    }

    pub async fn solve(&self, request: &MathRequest) -> Result<MathSolution, MathError> {
        let problem = request.problem.trim();
        if problem.is_empty() {
            return Err(MathError::MissingProblem);
        }

        let detail = if request.show_steps {
            "Provide detailed steps showing all work."
        } else {
            "Provide the answer with a brief explanation."
        };
        let system = prompts::render(&self.prompts, prompts::SOLVE_MATH_SYSTEM, &[])?;
        let prompt = prompts::render(
            &self.prompts,
            prompts::SOLVE_MATH,
            &[("problem", problem), ("detail", detail)],
        )?;

        info!(show_steps = request.show_steps, "Solving math problem");
        let completion = self
            .client
            .complete(CompletionRequest::new(prompt, SOLVE_MAX_TOKENS).with_system(system))
            .await?;

        Ok(parse_solution(&completion.text))
    }
}
