// src/agent/mod.rs

use crate::config::{Config, CredentialStore, HostConfig};
use crate::context::gather_context;
use crate::engine::{ExecutionEngine, ExecutionReport, ExecutionRequest};
use crate::error::Result;
use crate::history::HistoryLog;
use crate::llm::LanguageModel;
use crate::policy::PolicyEnforcer;
use crate::prompt::PromptBuilder;
use crate::protocol::{Plan, Risk};
use crate::protocol::planner::{LlmPlanner, Planner};
use crate::runner::{OutputSink, Runner, build_runner};
use tracing::info;

/// A plan that passed validation and policy, bound to the host it targets.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedInstruction {
    pub instruction: String,
    pub host: String,
    pub plan: Plan,
    pub commands: Vec<String>,
}

/// What to do before executing a cleared plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Approval {
    /// The operator passed the skip flag.
    Skip,
    /// Prompt; `default_yes` is false when the plan asks for confirmation or its risk is over the allowance.
    Ask { default_yes: bool },
}

impl PlannedInstruction {
    pub fn approval(&self, allow_risk: Risk, assume_yes: bool) -> Approval {
        if assume_yes {
            return Approval::Skip;
        }
        Approval::Ask {
            default_yes: !self.plan.needs_confirmation(allow_risk),
        }
    }
}

/// Wires the pipeline together: prompt, model, validation, policy, execution, history.
pub struct Operator<'a> {
    config: &'a Config,
    model: &'a dyn LanguageModel,
    history: &'a dyn HistoryLog,
    credentials: &'a dyn CredentialStore,
}

impl<'a> Operator<'a> {
    pub fn new(
        config: &'a Config,
        model: &'a dyn LanguageModel,
        history: &'a dyn HistoryLog,
        credentials: &'a dyn CredentialStore,
    ) -> Self {
        Self {
            config,
            model,
            history,
            credentials,
        }
    }

    pub fn host(&self, name: &str) -> Result<&'a HostConfig> {
        PromptBuilder::new(self.config).resolve_host(name)
    }

    /// Plans without touching the target. Fails before execution on any prompt, model,
    /// validation or policy error; nothing is written to history.
    pub fn plan(&self, instruction: &str, host: &str, with_context: bool) -> Result<PlannedInstruction> {
        let target = self.host(host)?;
        let context = if with_context {
            gather_context(target, self.credentials)
        } else {
            None
        };

        let planner = LlmPlanner::new(self.model, PromptBuilder::new(self.config));
        let validated = planner.plan(instruction, Some(host), context.as_deref())?;
        PolicyEnforcer::from_config(&self.config.policy)?.enforce(&validated.commands)?;

        info!(host, commands = validated.commands.len(), risk = %validated.plan.risk, "plan cleared");
        Ok(PlannedInstruction {
            instruction: instruction.to_string(),
            host: host.to_string(),
            plan: validated.plan,
            commands: validated.commands,
        })
    }

    /// Runs a cleared plan on the runner declared for its host.
    pub fn execute(&self, planned: &PlannedInstruction, sink: &mut dyn OutputSink) -> Result<ExecutionReport> {
        let runner = build_runner(self.host(&planned.host)?, self.config);
        self.execute_with(planned, runner, sink)
    }

    pub fn execute_with(
        &self,
        planned: &PlannedInstruction,
        runner: Box<dyn Runner>,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecutionReport> {
        let request = ExecutionRequest {
            host: &planned.host,
            instruction: &planned.instruction,
            plan: &planned.plan,
            commands: &planned.commands,
        };
        ExecutionEngine::new(self.history).execute(&request, runner, sink)
    }
}

/// Raw passthrough: no planning, no policy, no history. Returns the remote exit code.
pub fn run_raw(config: &Config, host: &str, command: &str, sink: &mut dyn OutputSink) -> Result<i32> {
    let target = PromptBuilder::new(config).resolve_host(host)?;
    run_single(build_runner(target, config), command, sink)
}

/// Connects, runs one command and closes the runner on every path.
pub fn run_single(mut runner: Box<dyn Runner>, command: &str, sink: &mut dyn OutputSink) -> Result<i32> {
    let outcome = runner.connect().and_then(|()| {
        sink.on_command_start(command);
        let exit_code = runner.run_command_streaming(command, sink)?;
        sink.on_command_exit(command, exit_code);
        Ok(exit_code)
    });
    runner.close();
    outcome
}
