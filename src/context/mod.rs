// src/context/mod.rs

use crate::config::{CredentialStore, HostConfig};
use crate::error::{Result, WpAiError};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const API_NAMESPACE: &str = "wpdoctor/v1";
const API_TIMEOUT: Duration = Duration::from_secs(15);
const ERROR_TAIL_LINES: usize = 20;

/// REST client for the WP Doctor plugin, rooted at the site's `wp-json` URL.
pub struct DiagnosticsClient {
    client: Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl DiagnosticsClient {
    pub fn new(base_url: &str, auth: Option<(String, String)>) -> Result<Self> {
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| WpAiError::Diagnostics(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_NAMESPACE, path)
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut request = self.client.get(self.endpoint(path)).query(query);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request
            .send()
            .map_err(|e| WpAiError::Diagnostics(format!("{} request failed: {}", path, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WpAiError::Diagnostics(format!("{} returned {}", path, status)));
        }
        response
            .json()
            .map_err(|e| WpAiError::Diagnostics(format!("{} returned invalid JSON: {}", path, e)))
    }

    pub fn system_info(&self) -> Result<Value> {
        self.get("system-info", &[])
    }

    pub fn plugins_analysis(&self, status: &str, with_updates: bool) -> Result<Value> {
        self.get(
            "plugins-analysis",
            &[("status", status.to_string()), ("with_updates", with_updates.to_string())],
        )
    }

    pub fn error_logs(&self, lines: u32, level: &str) -> Result<Value> {
        self.get(
            "error-logs",
            &[
                ("lines", lines.to_string()),
                ("level", level.to_string()),
                ("format", "json".to_string()),
                ("source", "auto".to_string()),
            ],
        )
    }

    pub fn db_check(&self) -> Result<Value> {
        self.get("db-check", &[])
    }
}

/// Raw diagnostics payloads; any of them may be missing.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticsPayloads {
    pub system_info: Option<Value>,
    pub plugins_analysis: Option<Value>,
    pub error_logs: Option<Value>,
    pub db_check: Option<Value>,
}

impl DiagnosticsPayloads {
    pub fn fetch(client: &DiagnosticsClient) -> Result<Self> {
        Ok(Self {
            system_info: Some(client.system_info()?),
            plugins_analysis: Some(client.plugins_analysis("active", true)?),
            error_logs: Some(client.error_logs(50, "error")?),
            db_check: Some(client.db_check()?),
        })
    }
}

/// First present, non-empty field among `keys`.
fn first_of<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|v| is_present(v))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

fn show(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

fn present(payload: &Option<Value>) -> Option<&Value> {
    payload.as_ref().filter(|v| is_present(v))
}

/// Condenses the payloads into a short text block for the prompt.
pub fn build_context_text(payloads: &DiagnosticsPayloads) -> String {
    let mut parts = Vec::new();

    if let Some(si) = present(&payloads.system_info) {
        parts.push(format!(
            "System: WP={} PHP={} OS={}",
            show(first_of(si, &["wordpress_version", "wp_version", "wp"])),
            show(first_of(si, &["php_version", "php"])),
            show(first_of(si, &["server_os", "os"])),
        ));
    }

    if let Some(pa) = present(&payloads.plugins_analysis) {
        let active = first_of(pa, &["active_count"]).map(|v| show(Some(v))).or_else(|| {
            pa.get("plugins").and_then(Value::as_array).map(|plugins| {
                plugins
                    .iter()
                    .filter(|p| p.get("status").and_then(Value::as_str) == Some("active"))
                    .count()
                    .to_string()
            })
        });
        let updates = match pa.get("updates") {
            Some(Value::Array(list)) => Some(list.len().to_string()),
            Some(Value::Object(summary)) => summary.get("count").map(|c| show(Some(c))),
            None => Some("0".to_string()),
            Some(_) => None,
        };
        parts.push(format!(
            "Plugins: active={} updates={}",
            active.unwrap_or_else(|| "unknown".into()),
            updates.unwrap_or_else(|| "unknown".into())
        ));
    }

    if let Some(el) = present(&payloads.error_logs) {
        let lines: Option<Vec<&str>> = match first_of(el, &["tail", "lines", "log"]) {
            Some(Value::Array(items)) => Some(items.iter().filter_map(Value::as_str).collect()),
            Some(Value::String(text)) => Some(text.lines().collect()),
            _ => None,
        };
        if let Some(lines) = lines.filter(|l| !l.is_empty()) {
            let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
            parts.push(format!("Recent Errors:\n{}", lines[start..].join("\n")));
        }
    }

    if let Some(db) = present(&payloads.db_check) {
        parts.push(format!(
            "DB: autoload={} overhead={}",
            show(first_of(db, &["autoload_size", "autoload_bytes"])),
            show(db.get("overhead").filter(|v| !v.is_null())),
        ));
    }

    parts.join("\n")
}

/// Live context for a host, or `None` when the host has no API or no credentials.
/// Fetch failures are logged and yield `None`.
pub fn gather_context(host: &HostConfig, credentials: &dyn CredentialStore) -> Option<String> {
    let api_url = host.api_url.as_deref()?;
    let Some(auth) = credentials.api_basic_auth(&host.name) else {
        warn!(host = %host.name, "no API credentials found; skipping context");
        return None;
    };

    let fetched = DiagnosticsClient::new(api_url, Some(auth)).and_then(|client| DiagnosticsPayloads::fetch(&client));
    match fetched {
        Ok(payloads) => {
            let text = build_context_text(&payloads);
            info!(host = %host.name, bytes = text.len(), "gathered diagnostics context");
            Some(text).filter(|t| !t.is_empty())
        }
        Err(e) => {
            warn!(host = %host.name, error = %e, "context fetch failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn condenses_every_payload() {
        let payloads = DiagnosticsPayloads {
            system_info: Some(json!({ "wp_version": "6.5.2", "php_version": "8.2.10", "server_os": "Linux" })),
            plugins_analysis: Some(json!({
                "plugins": [
                    { "slug": "akismet", "status": "active" },
                    { "slug": "hello", "status": "inactive" },
                    { "slug": "woocommerce", "status": "active" }
                ],
                "updates": [{ "slug": "woocommerce" }]
            })),
            error_logs: Some(json!({ "tail": "PHP Warning: a\nPHP Fatal error: b" })),
            db_check: Some(json!({ "autoload_bytes": 912345, "overhead": "1.2 MB" })),
        };

        let text = build_context_text(&payloads);
        assert_eq!(
            text,
            "System: WP=6.5.2 PHP=8.2.10 OS=Linux\n\
             Plugins: active=2 updates=1\n\
             Recent Errors:\nPHP Warning: a\nPHP Fatal error: b\n\
             DB: autoload=912345 overhead=1.2 MB"
        );
    }

    #[test]
    fn error_tail_is_capped() {
        let lines: Vec<String> = (1..=30).map(|i| format!("line {i}")).collect();
        let payloads = DiagnosticsPayloads {
            error_logs: Some(json!({ "lines": lines })),
            ..Default::default()
        };
        let text = build_context_text(&payloads);
        assert!(text.starts_with("Recent Errors:\nline 11\n"));
        assert!(text.ends_with("line 30"));
    }

    #[test]
    fn missing_or_empty_payloads_are_skipped() {
        assert_eq!(build_context_text(&DiagnosticsPayloads::default()), "");

        let payloads = DiagnosticsPayloads {
            system_info: Some(json!({})),
            plugins_analysis: Some(json!({ "active_count": 4, "updates": { "count": 2 } })),
            ..Default::default()
        };
        assert_eq!(build_context_text(&payloads), "Plugins: active=4 updates=2");
    }

    #[test]
    fn endpoints_live_under_the_plugin_namespace() {
        let client = DiagnosticsClient::new("https://example.com/wp-json/", None).unwrap();
        assert_eq!(client.endpoint("db-check"), "https://example.com/wp-json/wpdoctor/v1/db-check");
    }
}
