// src/engine/mod.rs

use crate::error::{Result, WpAiError};
use crate::history::{HistoryEntry, HistoryLog};
use crate::protocol::{ExecutionResult, Plan};
use crate::runner::{OutputSink, OutputStream, Runner};
use std::sync::mpsc::Sender;
use tracing::{info, warn};

/// Everything the engine needs to know about one policy-cleared plan.
#[derive(Clone, Debug)]
pub struct ExecutionRequest<'a> {
    pub host: &'a str,
    pub instruction: &'a str,
    pub plan: &'a Plan,
    pub commands: &'a [String],
}

/// Results of a run that reached the end of the loop.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionReport {
    pub results: Vec<ExecutionResult>,
}

impl ExecutionReport {
    /// The command that halted the run, if any.
    pub fn failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| !r.succeeded())
    }

    pub fn succeeded(&self) -> bool {
        self.failure().is_none()
    }

    /// `RemoteCommand` carrying the completed results when a command failed.
    pub fn into_result(self) -> Result<Vec<ExecutionResult>> {
        match self.failure().cloned() {
            Some(failed) => Err(WpAiError::RemoteCommand {
                command: failed.command,
                exit_code: failed.exit_code,
                completed: self.results,
            }),
            None => Ok(self.results),
        }
    }
}

/// Drives commands through a runner, strictly in order, stopping at the first non-zero exit.
pub struct ExecutionEngine<'h> {
    history: &'h dyn HistoryLog,
}

impl<'h> ExecutionEngine<'h> {
    pub fn new(history: &'h dyn HistoryLog) -> Self {
        Self { history }
    }

    /// Takes ownership of the runner, closes it on every path and appends exactly one history entry.
    pub fn execute(
        &self,
        request: &ExecutionRequest<'_>,
        mut runner: Box<dyn Runner>,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecutionReport> {
        let mut results = Vec::with_capacity(request.commands.len());
        let outcome = run_all(runner.as_mut(), request.commands, sink, &mut results);
        runner.close();

        let entry = HistoryEntry::new(request.host, request.instruction, request.plan.clone(), results.clone());
        let logged = self.history.append(&entry);

        match (outcome, logged) {
            (Ok(()), Ok(())) => Ok(ExecutionReport { results }),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(log_error)) => {
                warn!(error = %log_error, "history append failed after execution error");
                Err(e)
            }
        }
    }
}

fn run_all(
    runner: &mut dyn Runner,
    commands: &[String],
    sink: &mut dyn OutputSink,
    results: &mut Vec<ExecutionResult>,
) -> Result<()> {
    runner.connect()?;

    for command in commands {
        sink.on_command_start(command);
        let exit_code = runner.run_command_streaming(command, sink)?;
        sink.on_command_exit(command, exit_code);
        results.push(ExecutionResult::new(command, exit_code));

        if exit_code != 0 {
            info!(command = %command, exit_code, "command failed, halting");
            break;
        }
    }
    Ok(())
}

/// Progress messages for a presentation layer running the pipeline on a worker thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionEvent {
    CommandStarted(String),
    Output(OutputStream, String),
    CommandExited { command: String, exit_code: i32 },
}

/// Forwards runner output over a channel; a dropped receiver is ignored.
pub struct ChannelSink(pub Sender<ExecutionEvent>);

impl OutputSink for ChannelSink {
    fn on_line(&mut self, stream: OutputStream, line: &str) {
        let _ = self.0.send(ExecutionEvent::Output(stream, line.to_string()));
    }

    fn on_command_start(&mut self, command: &str) {
        let _ = self.0.send(ExecutionEvent::CommandStarted(command.to_string()));
    }

    fn on_command_exit(&mut self, command: &str, exit_code: i32) {
        let _ = self.0.send(ExecutionEvent::CommandExited {
            command: command.to_string(),
            exit_code,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerKind;
    use crate::history::InMemoryHistory;
    use crate::protocol::Risk;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::cell::RefCell;
    use std::sync::mpsc;

    #[derive(Default)]
    struct Journal {
        dispatched: Vec<String>,
        closed: usize,
    }

    struct ScriptedRunner {
        exit_codes: HashMap<String, i32>,
        fail_connect: bool,
        error_on: Option<String>,
        journal: Rc<RefCell<Journal>>,
    }

    impl ScriptedRunner {
        fn new(journal: &Rc<RefCell<Journal>>) -> Self {
            Self {
                exit_codes: HashMap::new(),
                fail_connect: false,
                error_on: None,
                journal: Rc::clone(journal),
            }
        }

        fn exits(mut self, command: &str, code: i32) -> Self {
            self.exit_codes.insert(command.into(), code);
            self
        }
    }

    impl Runner for ScriptedRunner {
        fn kind(&self) -> RunnerKind {
            RunnerKind::Ssh
        }

        fn connect(&mut self) -> Result<()> {
            if self.fail_connect {
                return Err(WpAiError::connection("host key not trusted", "run ssh-keyscan"));
            }
            Ok(())
        }

        fn run_command_streaming(&mut self, command: &str, sink: &mut dyn OutputSink) -> Result<i32> {
            self.journal.borrow_mut().dispatched.push(command.to_string());
            if self.error_on.as_deref() == Some(command) {
                return Err(WpAiError::connection("channel closed", "retry"));
            }
            sink.on_line(OutputStream::Stdout, &format!("ran {command}"));
            Ok(*self.exit_codes.get(command).unwrap_or(&0))
        }

        fn close(&mut self) {
            self.journal.borrow_mut().closed += 1;
        }
    }

    fn plan() -> Plan {
        Plan {
            intent: "Maintenance".into(),
            risk: Risk::Low,
            reason: "routine".into(),
            commands: Some(vec!["A".into(), "B".into(), "C".into()]),
            steps: None,
            requires_confirmation: None,
        }
    }

    fn commands() -> Vec<String> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    fn quiet() -> impl FnMut(OutputStream, &str) {
        |_: OutputStream, _: &str| {}
    }

    #[test]
    fn halts_after_first_failure() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let history = InMemoryHistory::new();
        let plan = plan();
        let commands = commands();
        let request = ExecutionRequest { host: "docker", instruction: "fix it", plan: &plan, commands: &commands };

        let runner = ScriptedRunner::new(&journal).exits("B", 2);
        let report = ExecutionEngine::new(&history)
            .execute(&request, Box::new(runner), &mut quiet())
            .unwrap();

        assert_eq!(report.results, vec![ExecutionResult::new("A", 0), ExecutionResult::new("B", 2)]);
        assert_eq!(journal.borrow().dispatched, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(journal.borrow().closed, 1);

        let entries = history.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].results.len(), 2);

        match report.into_result() {
            Err(WpAiError::RemoteCommand { command, exit_code, completed }) => {
                assert_eq!(command, "B");
                assert_eq!(exit_code, 2);
                assert_eq!(completed.len(), 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn success_logs_every_result_once() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let history = InMemoryHistory::new();
        let plan = plan();
        let commands = commands();
        let request = ExecutionRequest { host: "docker", instruction: "fix it", plan: &plan, commands: &commands };

        let report = ExecutionEngine::new(&history)
            .execute(&request, Box::new(ScriptedRunner::new(&journal)), &mut quiet())
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].results.len(), 3);
        assert_eq!(history.entries()[0].plan, plan);
    }

    #[test]
    fn runner_errors_still_close_and_log() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let history = InMemoryHistory::new();
        let plan = plan();
        let commands = commands();
        let request = ExecutionRequest { host: "docker", instruction: "fix it", plan: &plan, commands: &commands };

        let mut runner = ScriptedRunner::new(&journal);
        runner.error_on = Some("B".into());
        let err = ExecutionEngine::new(&history)
            .execute(&request, Box::new(runner), &mut quiet())
            .unwrap_err();

        assert!(matches!(err, WpAiError::Connection { .. }));
        assert_eq!(journal.borrow().closed, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].results, vec![ExecutionResult::new("A", 0)]);
    }

    #[test]
    fn connect_failure_logs_empty_results() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let history = InMemoryHistory::new();
        let plan = plan();
        let commands = commands();
        let request = ExecutionRequest { host: "docker", instruction: "fix it", plan: &plan, commands: &commands };

        let mut runner = ScriptedRunner::new(&journal);
        runner.fail_connect = true;
        let err = ExecutionEngine::new(&history)
            .execute(&request, Box::new(runner), &mut quiet())
            .unwrap_err();

        assert!(matches!(err, WpAiError::Connection { .. }));
        assert!(journal.borrow().dispatched.is_empty());
        assert_eq!(journal.borrow().closed, 1);
        assert!(history.entries()[0].results.is_empty());
    }

    #[test]
    fn channel_sink_reports_progress_in_order() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let history = InMemoryHistory::new();
        let plan = plan();
        let commands = vec!["A".to_string()];
        let request = ExecutionRequest { host: "docker", instruction: "fix it", plan: &plan, commands: &commands };

        let (tx, rx) = mpsc::channel();
        ExecutionEngine::new(&history)
            .execute(&request, Box::new(ScriptedRunner::new(&journal)), &mut ChannelSink(tx))
            .unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ExecutionEvent::CommandStarted("A".into()),
                ExecutionEvent::Output(OutputStream::Stdout, "ran A".into()),
                ExecutionEvent::CommandExited { command: "A".into(), exit_code: 0 },
            ]
        );
    }
}
