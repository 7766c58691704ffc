pub mod confidence;
pub mod generation;
pub mod grading;
pub mod llm_client;
pub mod math;
pub mod problem_shape;
pub mod prompts;
pub mod selector;
