// src/policy/mod.rs

use crate::config::PolicyConfig;
use crate::error::{Result, WpAiError};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub command: String,
    pub pattern: String,
}

/// Blocklist of regex patterns; any match anywhere in a command blocks the whole plan.
#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    rules: Vec<Regex>,
}

impl PolicyEnforcer {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    WpAiError::Config(format!("invalid policy pattern '{}': {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn from_config(policy: &PolicyConfig) -> Result<Self> {
        Self::new(&policy.blocklist)
    }

    pub fn violations(&self, commands: &[String]) -> Vec<Violation> {
        commands
            .iter()
            .flat_map(|command| {
                self.rules
                    .iter()
                    .filter(|rule| rule.is_match(command))
                    .map(|rule| Violation {
                        command: command.clone(),
                        pattern: rule.as_str().to_string(),
                    })
            })
            .collect()
    }

    /// Fails with every violation at once; there is no partial filtering.
    pub fn enforce(&self, commands: &[String]) -> Result<()> {
        let violations = self.violations(commands);
        if violations.is_empty() {
            return Ok(());
        }
        for v in &violations {
            tracing::info!(command = %v.command, pattern = %v.pattern, "policy violation");
        }
        Err(WpAiError::PolicyViolation(violations))
    }
}
