// src/runner/mod.rs

use crate::config::{Config, HostConfig, RunnerKind, RunnerSettings};
use crate::error::Result;
use std::time::Duration;

pub mod compose;
pub mod process;
pub mod ssh;

pub use compose::ComposeRunner;
pub use ssh::SshRunner;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives command output line by line as it arrives.
pub trait OutputSink {
    fn on_line(&mut self, stream: OutputStream, line: &str);

    fn on_command_start(&mut self, _command: &str) {}

    fn on_command_exit(&mut self, _command: &str, _exit_code: i32) {}
}

impl<F: FnMut(OutputStream, &str)> OutputSink for F {
    fn on_line(&mut self, stream: OutputStream, line: &str) {
        self(stream, line)
    }
}

/// A backend that dispatches one command at a time to a target.
pub trait Runner {
    fn kind(&self) -> RunnerKind;

    fn connect(&mut self) -> Result<()>;

    /// Blocks until the command exits; returns its exit code.
    fn run_command_streaming(&mut self, command: &str, sink: &mut dyn OutputSink) -> Result<i32>;

    fn close(&mut self);
}

/// Builds the runner declared by the host's `kind`.
pub fn build_runner(host: &HostConfig, config: &Config) -> Box<dyn Runner> {
    let connect_timeout = Duration::from_secs(config.runner.connect_timeout_secs);
    match &host.runner {
        RunnerSettings::Ssh(settings) => Box::new(SshRunner::new(
            settings.clone(),
            host.wp_path.clone(),
            host.wordpress_path.clone(),
            connect_timeout,
        )),
        RunnerSettings::Compose(settings) => Box::new(ComposeRunner::new(settings.clone())),
    }
}

/// Splits a byte stream into lines, holding back a trailing partial line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8], mut emit: impl FnMut(&str)) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            emit(trim_line_end(&String::from_utf8_lossy(&line)));
        }
    }

    pub fn finish(&mut self, mut emit: impl FnMut(&str)) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            emit(trim_line_end(&String::from_utf8_lossy(&rest)));
        }
    }
}

fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComposeSettings, SshSettings};

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buf = LineBuffer::default();
        let mut lines = Vec::new();
        buf.push(b"Success: The cache was fl", |l| lines.push(l.to_string()));
        assert!(lines.is_empty());
        buf.push(b"ushed.\r\nnext", |l| lines.push(l.to_string()));
        assert_eq!(lines, vec!["Success: The cache was flushed."]);
        buf.finish(|l| lines.push(l.to_string()));
        assert_eq!(lines, vec!["Success: The cache was flushed.", "next"]);
    }

    #[test]
    fn factory_follows_runner_kind() {
        let config = Config::default();
        let mut host = HostConfig {
            name: "local".into(),
            runner: RunnerSettings::Compose(ComposeSettings::default()),
            wp_path: None,
            wordpress_path: None,
            api_url: None,
        };
        assert_eq!(build_runner(&host, &config).kind(), RunnerKind::Compose);

        host.runner = RunnerSettings::Ssh(SshSettings {
            host: "example.com".into(),
            port: 22,
            user: "deploy".into(),
            key_path: None,
            password: None,
            strict_host_key_checking: true,
            known_hosts_path: None,
        });
        assert_eq!(build_runner(&host, &config).kind(), RunnerKind::Ssh);
    }
}
