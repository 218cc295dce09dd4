// src/config/mod.rs

use crate::error::{Result, WpAiError};
use crate::protocol::Risk;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod credentials;

pub use credentials::{CredentialStore, EnvCredentials, StaticCredentials};

pub const APP_NAME: &str = "wp-ai";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const HISTORY_FILE_NAME: &str = "history.jsonl";

/// Everything the pipeline reads from configuration, built once per process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,
    #[serde(default = "default_allow_risk")]
    pub allow_risk: Risk,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            blocklist: default_blocklist(),
            allow_risk: default_allow_risk(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub runner: RunnerSettings,
    /// Custom WP-CLI executable used instead of the generic `wp`.
    #[serde(default)]
    pub wp_path: Option<String>,
    /// WordPress installation path passed as `--path=`.
    #[serde(default)]
    pub wordpress_path: Option<String>,
    /// Base `wp-json` URL of the diagnostics REST API.
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    Ssh,
    Compose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunnerSettings {
    Ssh(SshSettings),
    Compose(ComposeSettings),
}

impl RunnerSettings {
    pub fn kind(&self) -> RunnerKind {
        match self {
            RunnerSettings::Ssh(_) => RunnerKind::Ssh,
            RunnerSettings::Compose(_) => RunnerKind::Compose,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub strict_host_key_checking: bool,
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,
}

impl SshSettings {
    pub fn known_hosts_file(&self) -> PathBuf {
        self.known_hosts_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ssh")
                .join("known_hosts")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeSettings {
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_workdir")]
    pub workdir: String,
    #[serde(default = "default_compose_program")]
    pub program: String,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            service: default_service(),
            file: None,
            workdir: default_workdir(),
            program: default_compose_program(),
        }
    }
}

fn default_provider() -> String {
    "gemini".into()
}

fn default_model() -> String {
    "gemini-1.5-flash".into()
}

/// Matches the bare `wp` and a path-prefixed executable such as `/opt/bin/wp`.
fn default_blocklist() -> Vec<String> {
    vec![r"^(\S*/)?wp db drop".into(), r"^(\S*/)?wp user delete".into()]
}

fn default_allow_risk() -> Risk {
    Risk::Low
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_ssh_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

fn default_service() -> String {
    "wpcli".into()
}

fn default_workdir() -> String {
    "/var/www/html".into()
}

fn default_compose_program() -> String {
    "docker-compose".into()
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(APP_NAME)
}

impl Config {
    /// Loads `explicit`, else `./config.toml`, else the user config file, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::from_file(&local);
        }
        let user = config_dir().join(CONFIG_FILE_NAME);
        if user.exists() {
            return Self::from_file(&user);
        }
        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            WpAiError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), hosts = config.hosts.len(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        for (i, host) in self.hosts.iter().enumerate() {
            if self.hosts[..i].iter().any(|h| h.name == host.name) {
                return Err(WpAiError::Config(format!(
                    "host '{}' is defined more than once",
                    host.name
                )));
            }
        }
        Ok(())
    }

    pub fn host(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn history_path(&self) -> PathBuf {
        self.history
            .path
            .clone()
            .unwrap_or_else(|| config_dir().join(HISTORY_FILE_NAME))
    }
}

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"[llm]
provider = "gemini"          # gemini | ollama | openai
model = "gemini-1.5-flash"

[policy]
allow_risk = "low"
# Patterns also match a custom wp_path such as /opt/bin/wp.
blocklist = [ '^(\S*/)?wp db drop', '^(\S*/)?wp user delete' ]

[runner]
connect_timeout_secs = 15

[[hosts]]
name = "docker"
# wp_path = "/opt/bin/wp"
# wordpress_path = "/home/site/public_html"
# api_url = "https://example.com/wp-json"

[hosts.runner]
kind = "ssh"
host = "localhost"
port = 2222
user = "kusanagi"
password = "password"
strict_host_key_checking = false

[[hosts]]
name = "local"

[hosts.runner]
kind = "compose"
service = "wpcli"
workdir = "/var/www/html"
"#;

/// Writes the default template to `path`, or to the user config directory.
pub fn write_default_config(path: Option<&Path>) -> Result<PathBuf> {
    let target = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_dir().join(CONFIG_FILE_NAME));
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&target, DEFAULT_CONFIG_TEMPLATE)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyEnforcer;

    #[test]
    fn default_blocklist_covers_custom_wp_paths() {
        let policy = PolicyEnforcer::from_config(&PolicyConfig::default()).unwrap();
        let commands: Vec<String> = [
            "wp db drop --yes",
            "/opt/bin/wp db drop --yes",
            "/usr/local/bin/wp user delete 3",
            "wp db export",
            "echo wp db drop",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();

        let flagged: Vec<_> = policy.violations(&commands).into_iter().map(|v| v.command).collect();
        assert_eq!(
            flagged,
            vec!["wp db drop --yes", "/opt/bin/wp db drop --yes", "/usr/local/bin/wp user delete 3"]
        );
    }

    #[test]
    fn default_template_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.policy.blocklist, default_blocklist());
        assert_eq!(config.policy.allow_risk, Risk::Low);

        let docker = config.host("docker").unwrap();
        match &docker.runner {
            RunnerSettings::Ssh(ssh) => {
                assert_eq!(ssh.port, 2222);
                assert!(!ssh.strict_host_key_checking);
            }
            other => panic!("unexpected runner: {other:?}"),
        }
        assert_eq!(config.host("local").unwrap().runner.kind(), RunnerKind::Compose);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.llm.provider, "gemini");
        assert!(config.hosts.is_empty());
        assert!(config.host("default").is_none());
    }

    #[test]
    fn ssh_defaults_are_strict() {
        let config = Config::from_toml(
            r#"
            [[hosts]]
            name = "prod"
            wp_path = "/usr/local/bin/wp-cli"
            [hosts.runner]
            kind = "ssh"
            host = "prod.example.com"
            user = "deploy"
            "#,
        )
        .unwrap();
        let prod = config.host("prod").unwrap();
        let RunnerSettings::Ssh(ssh) = &prod.runner else {
            panic!("expected ssh runner");
        };
        assert!(ssh.strict_host_key_checking);
        assert_eq!(ssh.port, 22);
        assert!(ssh.known_hosts_file().ends_with(".ssh/known_hosts"));
        assert_eq!(prod.wp_path.as_deref(), Some("/usr/local/bin/wp-cli"));
    }

    #[test]
    fn unknown_runner_kind_is_rejected() {
        let err = Config::from_toml(
            r#"
            [[hosts]]
            name = "x"
            [hosts.runner]
            kind = "telnet"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, WpAiError::Config(_)));
    }

    #[test]
    fn duplicate_host_names_are_rejected() {
        let err = Config::from_toml(
            r#"
            [[hosts]]
            name = "a"
            [hosts.runner]
            kind = "compose"
            [[hosts]]
            name = "a"
            [hosts.runner]
            kind = "compose"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, WpAiError::Config(_)));
    }

    #[test]
    fn write_default_config_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("config.toml");
        let written = write_default_config(Some(&target)).unwrap();
        assert_eq!(written, target);
        assert!(Config::from_file(&target).is_ok());
    }
}
