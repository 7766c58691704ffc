//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like database pools and service clients.

use crate::{config::Config, db::PracticeStore, rate_limit::RateLimiter, storage::FileStore};
use std::{collections::HashMap, sync::Arc};
use studyguide_core::{
    generation::ProblemGenerator, llm_client::CompletionClient, math::MathSolver,
};

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn PracticeStore>,
    pub completion_client: Arc<dyn CompletionClient>,
    pub generator: Arc<ProblemGenerator>,
    pub math_solver: Arc<MathSolver>,
    pub prompts: Arc<HashMap<String, String>>,
    /// `None` when no blob store is configured.
    pub file_store: Option<Arc<dyn FileStore>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the completion-backed services around one shared client.
    pub fn new(
        db: Arc<dyn PracticeStore>,
        completion_client: Arc<dyn CompletionClient>,
        prompts: HashMap<String, String>,
        file_store: Option<Arc<dyn FileStore>>,
        rate_limiter: Arc<RateLimiter>,
        config: Config,
    ) -> Self {
        let prompts = Arc::new(prompts);
        Self {
            db,
            generator: Arc::new(ProblemGenerator::new(
                Arc::clone(&completion_client),
                Arc::clone(&prompts),
            )),
            math_solver: Arc::new(MathSolver::new(
                Arc::clone(&completion_client),
                Arc::clone(&prompts),
            )),
            completion_client,
            prompts,
            file_store,
            rate_limiter,
            config: Arc::new(config),
        }
    }
}
