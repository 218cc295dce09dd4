// src/validation/mod.rs

pub mod plan;

pub use plan::{PlanValidationError, ValidatedPlan, strip_fences, validate_response};
