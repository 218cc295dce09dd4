// src/runner/ssh.rs

use crate::config::{RunnerKind, SshSettings};
use crate::error::{Result, WpAiError};
use crate::runner::{LineBuffer, OutputSink, OutputStream, Runner};
use ssh2::{CheckResult, KnownHostFileKind, Session};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

const GENERIC_TOOL: &str = "wp";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of looking the server key up in the trusted-hosts file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnownHostStatus {
    Match,
    NotFound,
    Mismatch,
    MissingStore,
    LookupFailed,
}

impl From<CheckResult> for KnownHostStatus {
    fn from(result: CheckResult) -> Self {
        match result {
            CheckResult::Match => KnownHostStatus::Match,
            CheckResult::NotFound => KnownHostStatus::NotFound,
            CheckResult::Mismatch => KnownHostStatus::Mismatch,
            CheckResult::Failure => KnownHostStatus::LookupFailed,
        }
    }
}

/// Strict mode accepts only a matching entry. A mismatched key is never accepted.
pub fn verify_host_key(
    strict: bool,
    status: KnownHostStatus,
    host: &str,
    port: u16,
    known_hosts: &Path,
) -> Result<()> {
    match status {
        KnownHostStatus::Match => Ok(()),
        KnownHostStatus::Mismatch => Err(WpAiError::connection(
            format!("host key for {}:{} does not match {}", host, port, known_hosts.display()),
            format!(
                "verify the server identity, then remove the stale entry with `ssh-keygen -R {}`",
                host
            ),
        )),
        _ if !strict => {
            tracing::warn!(%host, port, ?status, "accepting untrusted host key (strict_host_key_checking = false)");
            Ok(())
        }
        _ => Err(WpAiError::connection(
            format!(
                "no trusted host key for {}:{} in {} ({:?})",
                host,
                port,
                known_hosts.display(),
                status
            ),
            format!(
                "add it with `ssh-keyscan -p {} {} >> {}` or set strict_host_key_checking = false",
                port,
                host,
                known_hosts.display()
            ),
        )),
    }
}

/// Rewrites a generic `wp ...` command for hosts with a custom executable or site path.
/// Commands already carrying `--path=` are not given a second one.
pub fn rewrite_command(command: &str, wp_path: Option<&str>, site_path: Option<&str>) -> String {
    let trimmed = command.trim();
    let generic = trimmed == GENERIC_TOOL || trimmed.starts_with("wp ");
    let custom = wp_path.is_some_and(|wp| trimmed.starts_with(wp));

    let mut rewritten = match wp_path {
        Some(wp) if generic => format!("{}{}", wp, &trimmed[GENERIC_TOOL.len()..]),
        _ => trimmed.to_string(),
    };
    if let Some(site) = site_path {
        let has_path = rewritten
            .split_whitespace()
            .any(|token| token.starts_with("--path="));
        if (generic || custom) && !has_path {
            rewritten.push_str(&format!(" --path='{}'", site));
        }
    }

    if rewritten == trimmed {
        command.to_string()
    } else {
        rewritten
    }
}

/// Remote-shell runner holding one authenticated session for the whole execution.
pub struct SshRunner {
    settings: SshSettings,
    wp_path: Option<String>,
    site_path: Option<String>,
    connect_timeout: Duration,
    session: Option<Session>,
}

impl SshRunner {
    pub fn new(
        settings: SshSettings,
        wp_path: Option<String>,
        site_path: Option<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            wp_path,
            site_path,
            connect_timeout,
            session: None,
        }
    }

    fn target(&self) -> String {
        format!("{}@{}:{}", self.settings.user, self.settings.host, self.settings.port)
    }

    fn open_tcp(&self) -> Result<TcpStream> {
        let unreachable_err = |e: String| {
            WpAiError::connection(
                format!("cannot reach {}: {}", self.target(), e),
                "check host and port in config.toml and that sshd is running",
            )
        };
        let addr = (self.settings.host.as_str(), self.settings.port)
            .to_socket_addrs()
            .map_err(|e| unreachable_err(e.to_string()))?
            .next()
            .ok_or_else(|| unreachable_err("no address resolved".into()))?;
        TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| unreachable_err(e.to_string()))
    }

    fn check_host_key(&self, session: &Session) -> Result<()> {
        let known_hosts = self.settings.known_hosts_file();
        let status = match session.host_key() {
            None => KnownHostStatus::LookupFailed,
            Some((key, _)) => lookup_known_host(session, &known_hosts, &self.settings.host, self.settings.port, key),
        };
        verify_host_key(
            self.settings.strict_host_key_checking,
            status,
            &self.settings.host,
            self.settings.port,
            &known_hosts,
        )
    }

    fn authenticate(&self, session: &Session) -> Result<()> {
        let user = &self.settings.user;

        if let Some(key) = &self.settings.key_path {
            if let Err(e) = session.userauth_pubkey_file(user, None, key, None) {
                tracing::debug!(key = %key.display(), error = %e, "public key authentication failed");
                if self.settings.password.is_none() {
                    return Err(WpAiError::connection(
                        format!("authentication with key '{}' failed: {}", key.display(), e),
                        "check the key_path and the key file permissions",
                    ));
                }
            }
        }

        if !session.authenticated() {
            if let Some(password) = &self.settings.password {
                session.userauth_password(user, password).map_err(|e| {
                    WpAiError::connection(
                        format!("password authentication for {} failed: {}", self.target(), e),
                        "configure a key_path in config.toml or check the password",
                    )
                })?;
            } else if self.settings.key_path.is_none() {
                if let Err(e) = session.userauth_agent(user) {
                    tracing::debug!(error = %e, "ssh-agent authentication failed");
                }
            }
        }

        if session.authenticated() {
            Ok(())
        } else {
            Err(WpAiError::connection(
                format!("authentication failed for {}", self.target()),
                "public key authentication is required: configure a key_path in config.toml",
            ))
        }
    }

    fn pump(channel: &mut ssh2::Channel, sink: &mut dyn OutputSink) -> Result<()> {
        let mut stderr = channel.stderr();
        let mut out_lines = LineBuffer::default();
        let mut err_lines = LineBuffer::default();
        let mut buf = [0u8; 8192];

        loop {
            let mut progressed = false;

            match channel.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    out_lines.push(&buf[..n], |l| sink.on_line(OutputStream::Stdout, l));
                    progressed = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(stream_failure("stdout", e)),
            }
            match stderr.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    err_lines.push(&buf[..n], |l| sink.on_line(OutputStream::Stderr, l));
                    progressed = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(stream_failure("stderr", e)),
            }

            if !progressed {
                if channel.eof() {
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }

        out_lines.finish(|l| sink.on_line(OutputStream::Stdout, l));
        err_lines.finish(|l| sink.on_line(OutputStream::Stderr, l));
        Ok(())
    }
}

fn lookup_known_host(session: &Session, path: &Path, host: &str, port: u16, key: &[u8]) -> KnownHostStatus {
    if !path.exists() {
        return KnownHostStatus::MissingStore;
    }
    let Ok(mut known_hosts) = session.known_hosts() else {
        return KnownHostStatus::LookupFailed;
    };
    if let Err(e) = known_hosts.read_file(path, KnownHostFileKind::OpenSSH) {
        tracing::debug!(path = %path.display(), error = %e, "cannot read known_hosts");
        return KnownHostStatus::LookupFailed;
    }
    known_hosts.check_port(host, port, key).into()
}

fn stream_failure(stream: &str, e: std::io::Error) -> WpAiError {
    WpAiError::connection(
        format!("reading remote {} failed: {}", stream, e),
        "the SSH session was interrupted; check network stability",
    )
}

fn session_failure(action: &str, e: ssh2::Error) -> WpAiError {
    WpAiError::connection(
        format!("{} failed: {}", action, e),
        "check that the server accepts SSH sessions for this user",
    )
}

impl Runner for SshRunner {
    fn kind(&self) -> RunnerKind {
        RunnerKind::Ssh
    }

    fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let tcp = self.open_tcp()?;
        let mut session = Session::new().map_err(|e| session_failure("creating SSH session", e))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.connect_timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| session_failure("SSH handshake", e))?;

        self.check_host_key(&session)?;
        self.authenticate(&session)?;

        session.set_timeout(0);
        session.set_keepalive(true, 30);
        tracing::info!(remote = %self.target(), "ssh session established");
        self.session = Some(session);
        Ok(())
    }

    fn run_command_streaming(&mut self, command: &str, sink: &mut dyn OutputSink) -> Result<i32> {
        self.connect()?;
        let command = rewrite_command(command, self.wp_path.as_deref(), self.site_path.as_deref());
        tracing::debug!(%command, "ssh exec");

        let session = self.session.as_ref().ok_or_else(|| {
            WpAiError::connection("no SSH session", "connect the runner before dispatching commands")
        })?;
        let mut channel = session
            .channel_session()
            .map_err(|e| session_failure("opening channel", e))?;
        channel
            .exec(&command)
            .map_err(|e| session_failure("exec", e))?;

        session.set_blocking(false);
        let pumped = Self::pump(&mut channel, sink);
        session.set_blocking(true);
        pumped?;

        channel
            .wait_close()
            .map_err(|e| session_failure("closing channel", e))?;
        channel
            .exit_status()
            .map_err(|e| session_failure("reading exit status", e))
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect(None, "wp-ai done", None) {
                tracing::debug!(error = %e, "ssh disconnect failed");
            }
        }
    }
}

impl Drop for SshRunner {
    fn drop(&mut self) {
        self.close();
    }
}
