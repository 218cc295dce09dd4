// src/config/credentials.rs

use std::collections::HashMap;

/// Read-only source of secrets the pipeline needs.
pub trait CredentialStore {
    fn llm_api_key(&self, provider: &str) -> Option<String>;
    fn api_basic_auth(&self, host: &str) -> Option<(String, String)>;
}

/// Reads `<PROVIDER>_API_KEY` and `WP_AI_<HOST>_API_USER` / `WP_AI_<HOST>_API_PASS`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn provider_var(provider: &str) -> String {
        format!("{}_API_KEY", env_segment(provider))
    }

    pub fn host_vars(host: &str) -> (String, String) {
        let segment = env_segment(host);
        (
            format!("WP_AI_{}_API_USER", segment),
            format!("WP_AI_{}_API_PASS", segment),
        )
    }
}

impl CredentialStore for EnvCredentials {
    fn llm_api_key(&self, provider: &str) -> Option<String> {
        non_empty_var(&Self::provider_var(provider))
    }

    fn api_basic_auth(&self, host: &str) -> Option<(String, String)> {
        let (user_var, pass_var) = Self::host_vars(host);
        Some((non_empty_var(&user_var)?, non_empty_var(&pass_var)?))
    }
}

/// In-memory credentials, for embedding the pipeline without touching the environment.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    api_keys: HashMap<String, String>,
    basic_auth: HashMap<String, (String, String)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, provider: &str, key: &str) -> Self {
        self.api_keys.insert(provider.into(), key.into());
        self
    }

    pub fn with_basic_auth(mut self, host: &str, user: &str, password: &str) -> Self {
        self.basic_auth
            .insert(host.into(), (user.into(), password.into()));
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn llm_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.get(provider).cloned()
    }

    fn api_basic_auth(&self, host: &str) -> Option<(String, String)> {
        self.basic_auth.get(host).cloned()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
