// src/main.rs

use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wp_ai::agent::{self, Approval, Operator, PlannedInstruction};
use wp_ai::config::{self, Config, CredentialStore, EnvCredentials, HostConfig};
use wp_ai::context::DiagnosticsClient;
use wp_ai::history::{HistoryLog, InMemoryHistory, JsonlHistory};
use wp_ai::llm::{CancellationToken, ChatMessage, build_model};
use wp_ai::runner::{OutputSink, OutputStream};
use wp_ai::{Result, WpAiError};

const DEFAULT_HOST: &str = "docker";
const CHAT_SYSTEM_PROMPT: &str = "You are WP Doctor AI, a concise assistant for WordPress operations and WP-CLI.";

#[derive(Parser)]
#[command(name = "wp-ai", version, about = "Plan and run WP-CLI operations from plain-language instructions")]
struct Cli {
    /// Configuration file (defaults to ./config.toml, then ~/.config/wp-ai/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan commands for an instruction without executing them
    Plan {
        instruction: String,
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        /// Include live diagnostics from the site's API
        #[arg(long)]
        with_context: bool,
    },
    /// Plan, confirm and execute an instruction
    #[command(alias = "execute")]
    Say {
        instruction: String,
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Do not fetch live diagnostics
        #[arg(long)]
        no_context: bool,
    },
    /// Run a raw WP-CLI command; exits with the remote exit code
    Run {
        command: String,
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
    },
    /// Show recent execution history
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Canned maintenance commands
    Actions {
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        #[command(subcommand)]
        action: Action,
    },
    /// Query the diagnostics API
    Diag {
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        #[command(subcommand)]
        query: DiagQuery,
    },
    /// Write a default configuration file
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Inspect the language model configuration
    LlmConfig {
        #[command(subcommand)]
        command: LlmConfigCommand,
    },
    /// Chat with the configured model
    Aichat {
        #[command(subcommand)]
        command: ChatCommand,
    },
}

#[derive(Subcommand)]
enum Action {
    CacheFlush,
    RewriteFlush {
        /// Skip --hard
        #[arg(long)]
        soft: bool,
    },
    PluginActivate { slug: String },
    PluginDeactivate { slug: String },
}

impl Action {
    fn command(&self) -> String {
        match self {
            Action::CacheFlush => "wp cache flush".to_string(),
            Action::RewriteFlush { soft: true } => "wp rewrite flush".to_string(),
            Action::RewriteFlush { soft: false } => "wp rewrite flush --hard".to_string(),
            Action::PluginActivate { slug } => format!("wp plugin activate {}", slug),
            Action::PluginDeactivate { slug } => format!("wp plugin deactivate {}", slug),
        }
    }
}

#[derive(Subcommand)]
enum DiagQuery {
    System,
    Plugins {
        #[arg(long, default_value = "active")]
        status: String,
        #[arg(long)]
        no_updates: bool,
    },
    Logs {
        #[arg(long, default_value_t = 50)]
        lines: u32,
        #[arg(long, default_value = "all")]
        level: String,
    },
    Db,
}

#[derive(Subcommand)]
enum LlmConfigCommand {
    Show,
}

#[derive(Subcommand)]
enum ChatCommand {
    Ask { message: String },
}

/// Prints remote output as it arrives.
struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn on_line(&mut self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => println!("{}", line),
            OutputStream::Stderr => eprintln!("{}", line.yellow()),
        }
    }

    fn on_command_start(&mut self, command: &str) {
        println!("\n{} {}", "Running:".bold(), command);
    }

    fn on_command_exit(&mut self, _command: &str, exit_code: i32) {
        if exit_code != 0 {
            println!("{}", format!("Command failed with exit code {}", exit_code).red().bold());
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("WP_AI_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let Cli { config: config_path, command } = cli;
    let load_config = || Config::load(config_path.as_deref());
    let credentials = EnvCredentials;

    match command {
        Command::Init { path, force } => init(path.as_deref(), force),
        Command::Plan { instruction, host, with_context } => {
            let config = load_config()?;
            let model = build_model(&config.llm, &credentials)?;
            let history = InMemoryHistory::new();
            let operator = Operator::new(&config, model.as_ref(), &history, &credentials);

            println!("{}", "Thinking...".blue().bold());
            let planned = operator.plan(&instruction, &host, with_context)?;
            print_plan(&planned);
            Ok(ExitCode::SUCCESS)
        }
        Command::Say { instruction, host, yes, no_context } => {
            let config = load_config()?;
            let model = build_model(&config.llm, &credentials)?;
            let history = JsonlHistory::open(config.history_path())?;
            let operator = Operator::new(&config, model.as_ref(), &history, &credentials);

            println!("{}", "Thinking...".blue().bold());
            let planned = operator.plan(&instruction, &host, !no_context)?;
            print_plan(&planned);

            if !confirmed(&planned, &config, yes)? {
                println!("{}", "Aborted.".yellow());
                return Ok(ExitCode::SUCCESS);
            }

            let report = operator.execute(&planned, &mut ConsoleSink)?;
            let results = report.into_result()?;
            println!("\n{} {} command(s) succeeded", "Done:".green().bold(), results.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { command, host } => run_raw(&load_config()?, &host, &command),
        Command::Actions { host, action } => run_raw(&load_config()?, &host, &action.command()),
        Command::History { limit } => {
            show_history(&load_config()?, limit)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Diag { host, query } => {
            let config = load_config()?;
            let client = diagnostics_client(&config, &credentials, &host)?;
            let payload = match query {
                DiagQuery::System => client.system_info()?,
                DiagQuery::Plugins { status, no_updates } => client.plugins_analysis(&status, !no_updates)?,
                DiagQuery::Logs { lines, level } => client.error_logs(lines, &level)?,
                DiagQuery::Db => client.db_check()?,
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::LlmConfig { command: LlmConfigCommand::Show } => {
            println!("{}", serde_json::to_string_pretty(&load_config()?.llm)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Aichat { command: ChatCommand::Ask { message } } => {
            let config = load_config()?;
            let model = build_model(&config.llm, &credentials)?;
            let messages = [ChatMessage::system(CHAT_SYSTEM_PROMPT), ChatMessage::user(&message)];
            let cancel = CancellationToken::new();

            let mut stdout = std::io::stdout();
            for fragment in model.generate_stream(&messages, &cancel)? {
                write!(stdout, "{}", fragment?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init(path: Option<&std::path::Path>, force: bool) -> Result<ExitCode> {
    let target = path
        .map(PathBuf::from)
        .unwrap_or_else(|| config::config_dir().join(config::CONFIG_FILE_NAME));
    if target.exists() && !force {
        return Err(WpAiError::Config(format!(
            "{} already exists; pass --force to overwrite",
            target.display()
        )));
    }
    let written = config::write_default_config(Some(&target))?;
    println!("{} {}", "Wrote".green(), written.display());
    Ok(ExitCode::SUCCESS)
}

fn run_raw(config: &Config, host: &str, command: &str) -> Result<ExitCode> {
    let exit_code = agent::run_raw(config, host, command, &mut ConsoleSink)?;
    Ok(match exit_code {
        0 => ExitCode::SUCCESS,
        code => ExitCode::from(u8::try_from(code).unwrap_or(1)),
    })
}

fn confirmed(planned: &PlannedInstruction, config: &Config, yes: bool) -> Result<bool> {
    let default_yes = match planned.approval(config.policy.allow_risk, yes) {
        Approval::Skip => return Ok(true),
        Approval::Ask { default_yes } => default_yes,
    };
    if !default_yes {
        println!(
            "{}",
            format!(
                "Risk '{}' exceeds allowed '{}' or the plan asks for confirmation.",
                planned.plan.risk, config.policy.allow_risk
            )
            .yellow()
        );
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Execute these commands?")
        .default(default_yes)
        .interact()
        .map_err(|e| WpAiError::Confirmation(format!("{}; pass --yes to run without a prompt", e)))
}

fn print_plan(planned: &PlannedInstruction) {
    let plan = &planned.plan;
    println!("\n{} {}", "Intent:".bold(), plan.intent);
    println!("{} {}", "Risk:".bold(), plan.risk);
    println!("{} {}", "Reason:".bold(), plan.reason);
    println!("{}", "Proposed Commands:".bold());
    for command in &planned.commands {
        println!("  - {}", command);
    }
}

fn show_history(config: &Config, limit: usize) -> Result<()> {
    let path = config.history_path();
    if !path.exists() {
        println!("{}", "No history yet.".yellow());
        return Ok(());
    }
    for entry in JsonlHistory::open(&path)?.recent(limit)? {
        println!(
            "{} {} {}",
            entry.ts.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            format!("[{}]", entry.host).cyan(),
            entry.instruction
        );
        for result in &entry.results {
            let code = if result.succeeded() {
                result.exit_code.to_string().green()
            } else {
                result.exit_code.to_string().red()
            };
            println!("    {} {}", code, result.command);
        }
    }
    Ok(())
}

fn diagnostics_client(config: &Config, credentials: &dyn CredentialStore, host: &str) -> Result<DiagnosticsClient> {
    let target: &HostConfig = config
        .host(host)
        .ok_or_else(|| WpAiError::Config(format!("host '{}' not found in config", host)))?;
    let api_url = target
        .api_url
        .as_deref()
        .ok_or_else(|| WpAiError::Config(format!("host '{}' has no api_url", host)))?;
    let auth = credentials.api_basic_auth(host).ok_or_else(|| {
        let (user, pass) = EnvCredentials::host_vars(host);
        WpAiError::Config(format!("API credentials not found; set {} and {}", user, pass))
    })?;
    DiagnosticsClient::new(api_url, Some(auth))
}

fn report(error: &WpAiError) {
    eprintln!("{} {}", "Error:".red().bold(), error);
    match error {
        WpAiError::PolicyViolation(violations) => {
            for v in violations {
                eprintln!("  - {} (pattern: {})", v.command, v.pattern);
            }
        }
        WpAiError::ResponseFormat { raw, .. } => {
            eprintln!("{}", "Raw model response:".dimmed());
            eprintln!("{}", raw);
        }
        WpAiError::RemoteCommand { completed, .. } => {
            eprintln!("{} of the planned commands ran before the failure", completed.len());
        }
        _ => {}
    }
}
