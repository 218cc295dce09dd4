// src/protocol/mod.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod planner;

/// Risk level the model attaches to a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum Risk {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl Risk {
    pub const ALLOWED: [&'static str; 4] = ["low", "medium", "high", "unknown"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
            Risk::Unknown => "unknown",
        }
    }

    /// `Unknown` is never within an allowance; the others compare by severity.
    pub fn exceeds(&self, allowed: Risk) -> bool {
        match self {
            Risk::Unknown => true,
            _ => allowed != Risk::Unknown && *self > allowed,
        }
    }
}

impl FromStr for Risk {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Risk::Low),
            "medium" => Ok(Risk::Medium),
            "high" => Ok(Risk::High),
            "unknown" => Ok(Risk::Unknown),
            other => Err(format!(
                "risk must be one of {}, got '{}'",
                Risk::ALLOWED.join(", "),
                other
            )),
        }
    }
}

impl TryFrom<String> for Risk {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Risk> for String {
    fn from(risk: Risk) -> Self {
        risk.as_str().to_string()
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub cmd: String,
    /// Free-form annotation; only the plan-level risk is checked.
    #[serde(default)]
    pub risk: Option<String>,
    #[serde(default)]
    pub explain: Option<String>,
}

/// Structured plan emitted by the language model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub risk: Risk,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub commands: Option<Vec<String>>,
    #[serde(default)]
    pub steps: Option<Vec<PlanStep>>,
    #[serde(default)]
    pub requires_confirmation: Option<bool>,
}

impl Plan {
    /// `commands` verbatim when non-empty, otherwise the non-empty `steps[*].cmd` in order.
    pub fn resolved_commands(&self) -> Vec<String> {
        if let Some(commands) = self.commands.as_ref().filter(|c| !c.is_empty()) {
            return commands.clone();
        }
        self.steps
            .iter()
            .flatten()
            .filter(|step| !step.cmd.trim().is_empty())
            .map(|step| step.cmd.clone())
            .collect()
    }

    pub fn needs_confirmation(&self, allow_risk: Risk) -> bool {
        self.requires_confirmation.unwrap_or(false) || self.risk.exceeds(allow_risk)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn new(command: &str, exit_code: i32) -> Self {
        Self {
            command: command.to_string(),
            exit_code,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
