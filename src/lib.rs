// src/lib.rs

pub mod agent;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod history;
pub mod llm;
pub mod policy;
pub mod prompt;
pub mod protocol;
pub mod runner;
pub mod validation;

pub use error::{Result, WpAiError};
