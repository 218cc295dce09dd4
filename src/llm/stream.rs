// src/llm/stream.rs

use crate::error::{Result, WpAiError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a caller and a streaming model call.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Checks the token before every fragment; yields one `Cancelled` error, then ends.
pub struct Cancellable<I> {
    inner: I,
    token: CancellationToken,
    finished: bool,
}

impl<I> Cancellable<I> {
    pub fn new(inner: I, token: &CancellationToken) -> Self {
        Self {
            inner,
            token: token.clone(),
            finished: false,
        }
    }
}

impl<I: Iterator<Item = Result<String>>> Iterator for Cancellable<I> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.token.is_cancelled() {
            self.finished = true;
            return Some(Err(WpAiError::Cancelled));
        }
        let item = self.inner.next();
        if matches!(item, None | Some(Err(_))) {
            self.finished = true;
        }
        item
    }
}

/// Payload of a server-sent-events `data:` line.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim).filter(|d| !d.is_empty())
}
