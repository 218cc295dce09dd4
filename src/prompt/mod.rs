// src/prompt/mod.rs

use crate::config::{Config, HostConfig};
use crate::error::{Result, WpAiError};

const GENERIC_EXAMPLE: &str = "wp plugin list --status=active --format=table";

/// How the model must format WP-CLI commands for a given host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandFormat<'a> {
    /// Custom executable in place of `wp`, plus a trailing `--path=`.
    CustomExecutable { wp_path: &'a str, site_path: &'a str },
    /// Generic `wp` with a trailing `--path=`.
    SitePath { site_path: &'a str },
    Generic,
}

impl<'a> CommandFormat<'a> {
    pub fn for_host(host: Option<&'a HostConfig>) -> Self {
        let Some(host) = host else {
            return CommandFormat::Generic;
        };
        match (host.wp_path.as_deref(), host.wordpress_path.as_deref()) {
            (Some(wp_path), Some(site_path)) => CommandFormat::CustomExecutable { wp_path, site_path },
            (None, Some(site_path)) => CommandFormat::SitePath { site_path },
            _ => CommandFormat::Generic,
        }
    }

    fn instructions(&self) -> String {
        match self {
            CommandFormat::CustomExecutable { wp_path, site_path } => format!(
                r#"**CRITICAL COMMAND FORMAT REQUIREMENT**:
This host uses a custom WP-CLI executable. Every command MUST:

1. Start with `{wp_path}` instead of `wp`
2. Continue with the WP-CLI subcommand (without the `wp` prefix)
3. End with `--path='{site_path}'`

**Examples:**
- Not `wp cache flush` but `{wp_path} cache flush --path='{site_path}'`
- Not `wp plugin list --status=active` but `{wp_path} plugin list --status=active --path='{site_path}'`
- Not `wp core version` but `{wp_path} core version --path='{site_path}'`
"#
            ),
            CommandFormat::SitePath { site_path } => format!(
                r#"**IMPORTANT**: This host requires the WordPress path on every command.
Append `--path='{site_path}'` to all WP-CLI commands.

Example: `wp plugin list --path='{site_path}'`
"#
            ),
            CommandFormat::Generic => "Generate standard WP-CLI commands starting with `wp`.\n\n\
                 Example: `wp plugin list --status=active`\n"
                .to_string(),
        }
    }

    fn example_command(&self) -> String {
        match self {
            CommandFormat::CustomExecutable { wp_path, site_path } => {
                format!("{wp_path} cache flush --path='{site_path}'")
            }
            CommandFormat::SitePath { site_path } => {
                format!("{GENERIC_EXAMPLE} --path='{site_path}'")
            }
            CommandFormat::Generic => GENERIC_EXAMPLE.to_string(),
        }
    }
}

/// Composes the full model prompt. The user instruction is always the final section.
pub fn build_prompt(instruction: &str, context: Option<&str>, host: Option<&HostConfig>) -> String {
    let host_name = host.map(|h| h.name.as_str()).unwrap_or("unknown");
    let format = CommandFormat::for_host(host);
    let example = serde_json::to_string(&format.example_command()).unwrap_or_default();

    let mut prompt = format!(
        r#"**CRITICAL INSTRUCTION**: Respond with ONLY a valid JSON object. No markdown, no code blocks, no explanations.

You are WP Doctor AI, an assistant for WordPress operations.
Your goal is to help the user manage their WordPress site by generating WP-CLI commands.

## Constraints & Rules
1. **Safety First**: Never generate destructive commands (e.g. `db drop`, `rm -rf`) without a strong warning and `"requires_confirmation": true`.
2. **Command Format**: Generate commands in the EXACT format required by the target host.
3. **JSON Output**: Output the plan as strict JSON.

## WP-CLI Command Format Rules
{rules}
## Output Format

Output ONLY a raw JSON object starting with {{ and ending with }}, using this structure:
{{
  "intent": "Brief description of what you are about to do",
  "commands": [{example}],
  "risk": "low",
  "reason": "Why these commands were chosen"
}}

- Do NOT wrap the object in ```json or ``` fences.
- Do NOT add any text before or after the object.
- The "risk" field MUST be one of: "low", "medium", "high", "unknown".

Correct output:
{{"intent": "Clear WordPress cache", "commands": ["wp cache flush"], "risk": "low", "reason": "Safe operation to refresh cache"}}

## Context
Target Host: {host_name}
"#,
        rules = format.instructions(),
    );

    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\n[Current System Context]\n");
        prompt.push_str(context);
    }

    prompt.push_str("\n\n[User Instruction]\n");
    prompt.push_str(instruction);
    prompt
}

/// Resolves hosts by name against the loaded configuration before building the prompt.
pub struct PromptBuilder<'a> {
    config: &'a Config,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn resolve_host(&self, name: &str) -> Result<&'a HostConfig> {
        self.config.host(name).ok_or_else(|| {
            WpAiError::PromptBuild(format!("host '{}' not found in config", name))
        })
    }

    pub fn build(&self, instruction: &str, host: Option<&str>, context: Option<&str>) -> Result<String> {
        if instruction.trim().is_empty() {
            return Err(WpAiError::PromptBuild("instruction is empty".into()));
        }
        let host = host.map(|name| self.resolve_host(name)).transpose()?;
        Ok(build_prompt(instruction, context, host))
    }
}
