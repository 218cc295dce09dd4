// src/protocol/planner.rs

use crate::error::Result;
use crate::llm::LanguageModel;
use crate::prompt::PromptBuilder;
use crate::validation::plan::{ValidatedPlan, validate_response};
use tracing::debug;

/// Trait for turning an instruction into a validated plan.
pub trait Planner {
    fn plan(&self, instruction: &str, host: Option<&str>, context: Option<&str>) -> Result<ValidatedPlan>;
}

/// Asks a language model for a JSON plan and validates the answer.
pub struct LlmPlanner<'a> {
    model: &'a dyn LanguageModel,
    prompts: PromptBuilder<'a>,
}

impl<'a> LlmPlanner<'a> {
    pub fn new(model: &'a dyn LanguageModel, prompts: PromptBuilder<'a>) -> Self {
        Self { model, prompts }
    }
}

impl Planner for LlmPlanner<'_> {
    fn plan(&self, instruction: &str, host: Option<&str>, context: Option<&str>) -> Result<ValidatedPlan> {
        let prompt = self.prompts.build(instruction, host, context)?;
        debug!(provider = self.model.name(), prompt_len = prompt.len(), "requesting plan");

        let raw = self.model.generate(&prompt)?;
        debug!(provider = self.model.name(), raw = %raw, "model answered");

        Ok(validate_response(&raw)?)
    }
}
