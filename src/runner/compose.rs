// src/runner/compose.rs

use crate::config::{ComposeSettings, RunnerKind};
use crate::error::Result;
use crate::runner::process::stream_process;
use crate::runner::{OutputSink, Runner};
use std::process::Command;

/// Runs each command in a throwaway container via `docker-compose run --rm`.
pub struct ComposeRunner {
    settings: ComposeSettings,
}

impl ComposeRunner {
    pub fn new(settings: ComposeSettings) -> Self {
        Self { settings }
    }

    pub fn arguments(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(file) = &self.settings.file {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        args.extend(["run".to_string(), "--rm".to_string()]);
        if !self.settings.workdir.is_empty() {
            args.push("-w".to_string());
            args.push(self.settings.workdir.clone());
        }
        args.push(self.settings.service.clone());
        args.extend(["sh".to_string(), "-c".to_string(), command.to_string()]);
        args
    }
}

impl Runner for ComposeRunner {
    fn kind(&self) -> RunnerKind {
        RunnerKind::Compose
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn run_command_streaming(&mut self, command: &str, sink: &mut dyn OutputSink) -> Result<i32> {
        let mut process = Command::new(&self.settings.program);
        process.args(self.arguments(command));
        tracing::debug!(program = %self.settings.program, service = %self.settings.service, %command, "compose run");
        stream_process(process, sink)
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WpAiError;
    use crate::runner::OutputStream;
    use std::path::PathBuf;

    #[test]
    fn arguments_wrap_command_in_shell() {
        let runner = ComposeRunner::new(ComposeSettings {
            service: "cli".into(),
            file: Some(PathBuf::from("docker/compose.yml")),
            workdir: "/var/www/html".into(),
            program: "docker-compose".into(),
        });
        assert_eq!(
            runner.arguments("wp plugin list --format=json"),
            vec![
                "-f", "docker/compose.yml", "run", "--rm", "-w", "/var/www/html", "cli", "sh", "-c",
                "wp plugin list --format=json",
            ]
        );
    }

    #[test]
    fn default_settings_skip_compose_file() {
        let runner = ComposeRunner::new(ComposeSettings::default());
        let args = runner.arguments("wp core version");
        assert_eq!(args[0], "run");
        assert!(args.contains(&"wpcli".to_string()));
    }

    #[test]
    fn missing_compose_binary_fails_to_connect() {
        let mut runner = ComposeRunner::new(ComposeSettings {
            program: "wp-ai-no-such-compose".into(),
            ..ComposeSettings::default()
        });
        runner.connect().unwrap();
        let mut sink = |_: OutputStream, _: &str| {};
        assert!(matches!(
            runner.run_command_streaming("wp cache flush", &mut sink),
            Err(WpAiError::Connection { .. })
        ));
    }
}
