// src/runner/process.rs

use crate::error::{Result, WpAiError};
use crate::runner::{LineBuffer, OutputSink, OutputStream};
use std::io::{ErrorKind, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

/// Spawns `command` and forwards stdout/stderr lines in arrival order until it exits.
pub fn stream_process(mut command: Command, sink: &mut dyn OutputSink) -> Result<i32> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            WpAiError::connection(
                format!("failed to start '{}': {}", program, e),
                format!("check that '{}' is installed and on PATH", program),
            )
        })?;

    let (tx, rx) = mpsc::channel::<(OutputStream, String)>();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, OutputStream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, OutputStream::Stderr, tx.clone()));
    }
    drop(tx);

    for (stream, line) in rx {
        sink.on_line(stream, &line);
    }
    for reader in readers {
        let _ = reader.join();
    }

    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

/// Reads `source` to EOF so the child never sees a closed pipe; invalid UTF-8 is replaced.
fn forward_lines<R: Read + Send + 'static>(
    mut source: R,
    stream: OutputStream,
    tx: mpsc::Sender<(OutputStream, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut lines = LineBuffer::default();
        let mut chunk = [0u8; 8192];
        let send = |line: &str| {
            let _ = tx.send((stream, line.to_string()));
        };
        loop {
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => lines.push(&chunk[..n], send),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        lines.finish(send);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collected {
        lines: Vec<(OutputStream, String)>,
    }

    impl OutputSink for Collected {
        fn on_line(&mut self, stream: OutputStream, line: &str) {
            self.lines.push((stream, line.to_string()));
        }
    }

    #[cfg(unix)]
    #[test]
    fn streams_both_pipes_and_returns_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo one; echo two >&2; echo three; exit 3");
        let mut sink = Collected::default();
        let code = stream_process(cmd, &mut sink).unwrap();
        assert_eq!(code, 3);

        let stdout: Vec<_> = sink
            .lines
            .iter()
            .filter(|(s, _)| *s == OutputStream::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout, vec!["one", "three"]);
        assert!(sink.lines.contains(&(OutputStream::Stderr, "two".to_string())));
    }

    #[cfg(unix)]
    #[test]
    fn invalid_utf8_does_not_stop_the_stream() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'a\\n\\377\\n'; sleep 0.3; echo b; exit 0");
        let mut sink = Collected::default();
        let code = stream_process(cmd, &mut sink).unwrap();
        assert_eq!(code, 0);

        let lines: Vec<_> = sink.lines.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(lines, vec!["a", "\u{FFFD}", "b"]);
    }

    #[test]
    fn missing_program_is_a_connection_error() {
        let cmd = Command::new("wp-ai-definitely-not-installed");
        let mut sink = Collected::default();
        assert!(matches!(
            stream_process(cmd, &mut sink),
            Err(WpAiError::Connection { .. })
        ));
    }
}
