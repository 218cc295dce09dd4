// src/error.rs

use crate::policy::Violation;
use crate::protocol::ExecutionResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WpAiError {
    #[error("Prompt build failed: {0}")]
    PromptBuild(String),

    #[error("Language model call failed: {0}")]
    ModelInvocation(String),

    #[error("Model response is not valid JSON: {message}")]
    ResponseFormat { message: String, raw: String },

    #[error("Plan failed schema validation: {0}")]
    SchemaValidation(String),

    #[error("Plan contains no commands. Expected 'commands' or 'steps[*].cmd'.")]
    EmptyPlan,

    #[error("Blocked by policy: {} command(s) match blocklist patterns", .0.len())]
    PolicyViolation(Vec<Violation>),

    #[error("Connection failed: {message} ({remediation})")]
    Connection { message: String, remediation: String },

    #[error("Command '{command}' failed with exit code {exit_code}")]
    RemoteCommand {
        command: String,
        exit_code: i32,
        completed: Vec<ExecutionResult>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Diagnostics API error: {0}")]
    Diagnostics(String),

    #[error("Could not confirm execution: {0}")]
    Confirmation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WpAiError {
    pub fn connection(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        WpAiError::Connection {
            message: message.into(),
            remediation: remediation.into(),
        }
    }
}

impl From<serde_json::Error> for WpAiError {
    fn from(e: serde_json::Error) -> Self {
        WpAiError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for WpAiError {
    fn from(e: toml::de::Error) -> Self {
        WpAiError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WpAiError>;
