// SPDX-License-Identifier: Apache-2.0

//! Operation context
//!
//! An [`OpContext`] travels with every query and lifecycle call. It carries
//! the guard whitelist marker, an optional deadline, a cancellation token
//! (with the cause that cancelled it) and free-form string values.
//! Deriving a context never mutates the original, and markers set on a
//! parent are inherited by every context derived from it.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::DatasourceError;

pub type CancelCause = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct OpContext {
    whitelisted: bool,
    deadline: Option<Instant>,
    values: Arc<BTreeMap<String, String>>,
    token: CancellationToken,
    cause: Option<CancelCause>,
}

impl OpContext {
    /// A root context: not whitelisted, no deadline, never cancelled.
    pub fn background() -> Self {
        Self {
            whitelisted: false,
            deadline: None,
            values: Arc::new(BTreeMap::new()),
            token: CancellationToken::new(),
            cause: None,
        }
    }

    /// Derives a context that bypasses the SQL guard.
    pub fn with_whitelist(&self) -> Self {
        let mut ctx = self.clone();
        ctx.whitelisted = true;
        ctx
    }

    pub fn is_whitelisted(&self) -> bool {
        self.whitelisted
    }

    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        Arc::make_mut(&mut ctx.values).insert(key.into(), value.into());
        ctx
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Derives a context whose deadline is at most `timeout` from now.
    /// An earlier inherited deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        ctx
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Derives a context with its own child token. Cancelling the parent
    /// cancels the child, not the other way round.
    pub fn child(&self) -> Self {
        let mut ctx = self.clone();
        ctx.token = self.token.child_token();
        ctx
    }

    /// Derives an already-cancelled context recording why it was cancelled.
    /// The receiver is left untouched.
    pub fn cancel_with(&self, cause: CancelCause) -> Self {
        let mut ctx = self.child();
        ctx.cause = Some(cause);
        ctx.token.cancel();
        ctx
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// The error recorded by [`OpContext::cancel_with`], if any.
    pub fn cause(&self) -> Option<&CancelCause> {
        self.cause.as_ref()
    }

    /// Why this context is no longer usable, if it isn't.
    pub fn err(&self) -> Option<DatasourceError> {
        if self.token.is_cancelled() {
            return Some(DatasourceError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(DatasourceError::Timeout(Duration::ZERO))
            }
            _ => None,
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Returns a derived context that skips guard evaluation.
pub fn with_whitelist(ctx: &OpContext) -> OpContext {
    ctx.with_whitelist()
}

/// Reads the whitelist marker. False unless set through [`with_whitelist`].
pub fn is_whitelisted(ctx: &OpContext) -> bool {
    ctx.is_whitelisted()
}
