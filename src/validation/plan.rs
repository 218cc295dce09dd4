// src/validation/plan.rs

use crate::error::WpAiError;
use crate::protocol::{Plan, Risk};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n?(.*?)(?:```|\z)").expect("fence pattern")
});

#[derive(Debug)]
pub enum PlanValidationError {
    MalformedJson { message: String, raw: String },
    NotAnObject(&'static str),
    InvalidShape(String),
    NoCommands,
}

impl PlanValidationError {
    pub fn hint(&self) -> (String, Option<Value>) {
        match self {
            PlanValidationError::MalformedJson { .. } => (
                "Response must be a single raw JSON object.".to_string(),
                Some(json!({ "intent": "...", "commands": ["wp ..."], "risk": "low", "reason": "..." })),
            ),
            PlanValidationError::NotAnObject(kind) => (
                format!("Expected a JSON object, got {}.", kind),
                None,
            ),
            PlanValidationError::InvalidShape(reason) => (
                "Plan fields have the wrong type or value.".to_string(),
                Some(json!({ "reason": reason, "risk": Risk::ALLOWED })),
            ),
            PlanValidationError::NoCommands => (
                "Plan must contain 'commands' or 'steps[*].cmd'.".to_string(),
                Some(json!({ "commands": ["wp cache flush"] })),
            ),
        }
    }
}

impl From<PlanValidationError> for WpAiError {
    fn from(e: PlanValidationError) -> Self {
        let (hint, example) = e.hint();
        tracing::debug!(%hint, example = ?example, "plan rejected");
        match e {
            PlanValidationError::MalformedJson { message, raw } => {
                WpAiError::ResponseFormat { message, raw }
            }
            PlanValidationError::NotAnObject(kind) => {
                WpAiError::SchemaValidation(format!("expected a JSON object, got {}", kind))
            }
            PlanValidationError::InvalidShape(reason) => WpAiError::SchemaValidation(reason),
            PlanValidationError::NoCommands => WpAiError::EmptyPlan,
        }
    }
}

/// A plan that passed validation, with its resolved command list.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedPlan {
    pub plan: Plan,
    pub commands: Vec<String>,
}

/// Interior of the first fenced block, or the whole trimmed text when there is none.
pub fn strip_fences(response: &str) -> &str {
    let text = response.trim();
    match FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => text,
    }
}

pub fn validate_response(response: &str) -> Result<ValidatedPlan, PlanValidationError> {
    let body = strip_fences(response);

    let value: Value =
        serde_json::from_str(body).map_err(|e| PlanValidationError::MalformedJson {
            message: e.to_string(),
            raw: response.to_string(),
        })?;

    if !value.is_object() {
        return Err(PlanValidationError::NotAnObject(json_kind(&value)));
    }

    let plan: Plan = serde_json::from_value(value)
        .map_err(|e| PlanValidationError::InvalidShape(e.to_string()))?;

    let commands = plan.resolved_commands();
    if commands.is_empty() {
        return Err(PlanValidationError::NoCommands);
    }

    Ok(ValidatedPlan { plan, commands })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"intent":"Clear cache","commands":["wp cache flush","wp transient delete --all"],"risk":"low","reason":"safe"}"#;

    #[test]
    fn commands_resolve_verbatim() {
        let validated = validate_response(BODY).unwrap();
        assert_eq!(
            validated.commands,
            vec!["wp cache flush".to_string(), "wp transient delete --all".to_string()]
        );
        assert_eq!(validated.plan.risk, Risk::Low);
    }

    #[test]
    fn fenced_and_unfenced_bodies_agree() {
        let plain = validate_response(BODY).unwrap();
        let tagged = validate_response(&format!("```json\n{}\n```", BODY)).unwrap();
        let bare = validate_response(&format!("```\n{}\n```", BODY)).unwrap();
        let with_prose =
            validate_response(&format!("Here is the plan:\n```json\n{}\n```\nDone.", BODY)).unwrap();
        assert_eq!(plain, tagged);
        assert_eq!(plain, bare);
        assert_eq!(plain, with_prose);
    }

    #[test]
    fn unclosed_fence_uses_remaining_text() {
        let validated = validate_response(&format!("```json\n{}", BODY)).unwrap();
        assert_eq!(validated.commands.len(), 2);
    }

    #[test]
    fn unknown_risk_is_a_schema_error() {
        let err = validate_response(r#"{"intent":"x","commands":["wp cache flush"],"risk":"critical"}"#)
            .unwrap_err();
        assert!(matches!(err, PlanValidationError::InvalidShape(_)));
        assert!(matches!(WpAiError::from(err), WpAiError::SchemaValidation(_)));
    }

    #[test]
    fn wrong_field_type_is_a_schema_error() {
        let err = validate_response(r#"{"commands":"wp cache flush"}"#).unwrap_err();
        assert!(matches!(err, PlanValidationError::InvalidShape(_)));
        let err = validate_response(r#"["wp cache flush"]"#).unwrap_err();
        assert!(matches!(err, PlanValidationError::NotAnObject("an array")));
    }

    #[test]
    fn empty_commands_without_steps_is_empty_plan() {
        let err = validate_response(r#"{"intent":"x","commands":[],"risk":"low"}"#).unwrap_err();
        assert!(matches!(WpAiError::from(err), WpAiError::EmptyPlan));
    }

    #[test]
    fn steps_are_flattened() {
        let validated = validate_response(
            r#"{"intent":"x","risk":"medium","steps":[{"cmd":"wp plugin update --all","risk":"medium"},{"cmd":""},{"cmd":"wp cache flush","explain":"refresh"}]}"#,
        )
        .unwrap();
        assert_eq!(
            validated.commands,
            vec!["wp plugin update --all".to_string(), "wp cache flush".to_string()]
        );
    }

    #[test]
    fn step_risk_is_not_checked_against_the_enum() {
        let validated = validate_response(
            r#"{"risk":"low","steps":[{"cmd":"wp cache flush","risk":"critical"}]}"#,
        )
        .unwrap();
        assert_eq!(validated.commands, vec!["wp cache flush".to_string()]);
        assert_eq!(validated.plan.risk, Risk::Low);
        let steps = validated.plan.steps.unwrap();
        assert_eq!(steps[0].risk.as_deref(), Some("critical"));
    }

    #[test]
    fn malformed_json_keeps_raw_text() {
        let raw = "I think you should run wp cache flush";
        match WpAiError::from(validate_response(raw).unwrap_err()) {
            WpAiError::ResponseFormat { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn hints_carry_an_example_shape() {
        let (message, example) = PlanValidationError::NoCommands.hint();
        assert!(message.contains("steps[*].cmd"));
        assert_eq!(example.unwrap()["commands"][0], "wp cache flush");

        let (_, example) = PlanValidationError::InvalidShape("bad risk".into()).hint();
        assert_eq!(example.unwrap()["risk"][3], "unknown");
    }

    #[test]
    fn missing_risk_defaults_to_unknown() {
        let validated = validate_response(r#"{"commands":["wp core version"]}"#).unwrap();
        assert_eq!(validated.plan.risk, Risk::Unknown);
        assert!(validated.plan.intent.is_empty());
    }
}
