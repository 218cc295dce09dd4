// src/llm/ollama.rs

use crate::error::{Result, WpAiError};
use crate::llm::{
    Cancellable, CancellationToken, ChatMessage, FragmentStream, LanguageModel, http_client,
    response_lines, send,
};
use reqwest::blocking::Client;
use serde_json::{Value, json};

const DEFAULT_URL: &str = "http://localhost:11434";

/// Local model served by Ollama.
pub struct OllamaClient {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaClient {
    pub fn new(model: &str, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            model: model.to_string(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// One NDJSON line of `/api/chat`; `None` for empty keep-alive content.
pub fn chat_chunk(line: &str) -> Option<Result<String>> {
    if line.trim().is_empty() {
        return None;
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Some(Err(WpAiError::ModelInvocation(format!("bad ollama chunk: {}", e)))),
    };
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Some(Err(WpAiError::ModelInvocation(error.to_string())));
    }
    value
        .pointer("/message/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(|text| Ok(text.to_string()))
}

impl LanguageModel for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });
        let url = format!("{}/api/generate", self.base_url);
        let response = send("ollama", self.client.post(url).json(&payload))?;
        let body: Value = response
            .json()
            .map_err(|e| WpAiError::ModelInvocation(format!("Failed to parse JSON: {}", e)))?;
        body.get("response")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| WpAiError::ModelInvocation("LLM response missing 'response' field".into()))
    }

    fn generate_stream<'a>(
        &'a self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<FragmentStream<'a>> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": true
        });
        let url = format!("{}/api/chat", self.base_url);
        let response = send("ollama", self.client.post(url).json(&payload))?;
        let fragments = response_lines("ollama", response).filter_map(|line| match line {
            Ok(line) => chat_chunk(&line),
            Err(e) => Some(Err(e)),
        });
        Ok(Box::new(Cancellable::new(fragments, cancel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_chunks() {
        let chunk = r#"{"model":"llama3","message":{"role":"assistant","content":"wp "},"done":false}"#;
        assert_eq!(chat_chunk(chunk).unwrap().unwrap(), "wp ");

        let done = r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true}"#;
        assert!(chat_chunk(done).is_none());

        assert!(matches!(
            chat_chunk(r#"{"error":"model not found"}"#),
            Some(Err(WpAiError::ModelInvocation(_)))
        ));
        assert!(chat_chunk("").is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = OllamaClient::new("llama3", Some("http://gpu-box:11434/".into())).unwrap();
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }
}
