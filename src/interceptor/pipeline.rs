// SPDX-License-Identifier: Apache-2.0

//! Query Hook
//!
//! Two callbacks around every query:
//! 1. `before`: unless the context is whitelisted, runs the SQL guard. A
//!    violation is stashed on the event and the returned context is
//!    cancelled with the violation as its cause.
//! 2. `after`: classifies the elapsed time and emits one log line, using
//!    the stashed guard error in preference to the execution error.
//!
//! [`crate::Database`] turns a cancelled context into a hard error before
//! anything is sent to the server. Executors that drive the raw pool
//! themselves must check [`blocked_by_guard`] to get the same guarantee.

use std::sync::Arc;
use std::time::Duration;

use datagate_core::{Logger, OpContext};
use datagate_sql::{Guard, GuardError};
use tracing::{debug, error, info, trace, warn};

use super::profiling::{QueryLine, Severity};
use super::types::QueryEvent;

#[derive(Debug, Clone)]
pub struct QueryHook {
    guard: Option<Arc<Guard>>,
    logger: Logger,
    styled: bool,
}

impl QueryHook {
    /// Without a guard the hook only logs.
    pub fn new(logger: Logger, guard: Option<Arc<Guard>>) -> Self {
        Self {
            guard,
            logger,
            styled: true,
        }
    }

    /// Turns ANSI styling of the rendered line on or off.
    pub fn with_styling(mut self, styled: bool) -> Self {
        self.styled = styled;
        self
    }

    pub fn guard(&self) -> Option<&Arc<Guard>> {
        self.guard.as_ref()
    }

    pub fn before(&self, ctx: &OpContext, event: &mut QueryEvent) -> OpContext {
        let Some(guard) = &self.guard else {
            return ctx.clone();
        };
        if ctx.is_whitelisted() {
            self.logger
                .in_scope(|| trace!(query_id = %event.id, "whitelisted context, skipping SQL guard"));
            return ctx.clone();
        }

        match guard.check(&event.query) {
            Ok(()) => ctx.clone(),
            Err(err) => {
                let err = Arc::new(err);
                event.stash.insert(Arc::clone(&err));
                ctx.cancel_with(err)
            }
        }
    }

    pub fn after(&self, event: &QueryEvent) {
        let elapsed = event.elapsed();
        let (severity, error_text) = outcome(event, elapsed);
        let blocked = event.stash.get::<Arc<GuardError>>().is_some();

        let line = QueryLine {
            operation: event.operation,
            elapsed,
            severity,
            sql: &event.query,
            error: error_text.as_deref(),
        }
        .render(self.styled);

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        self.logger.in_scope(|| match severity {
            Severity::Low => {
                debug!(query_id = %event.id, operation = %event.operation, elapsed_ms, blocked, "{}", line)
            }
            Severity::Info => {
                info!(query_id = %event.id, operation = %event.operation, elapsed_ms, blocked, "{}", line)
            }
            Severity::Warn => {
                warn!(query_id = %event.id, operation = %event.operation, elapsed_ms, blocked, "{}", line)
            }
            Severity::High => {
                error!(query_id = %event.id, operation = %event.operation, elapsed_ms, blocked, "{}", line)
            }
        });
    }
}

/// Log severity and error text for a finished query. A stashed guard error
/// takes precedence over the execution error and is logged at warn or
/// above. "No rows" is not an error.
fn outcome(event: &QueryEvent, elapsed: Duration) -> (Severity, Option<String>) {
    let guard_error = event.stash.get::<Arc<GuardError>>();

    let error_text = match (guard_error, &event.error) {
        (Some(blocked), _) => Some(blocked.to_string()),
        (None, Some(err)) if !err.is_no_rows() => Some(err.to_string()),
        _ => None,
    };

    let mut severity = Severity::from_elapsed(elapsed);
    if guard_error.is_some() {
        severity = severity.max(Severity::Warn);
    }
    (severity, error_text)
}

/// The guard error a context was cancelled with, if it was.
pub fn blocked_by_guard(ctx: &OpContext) -> Option<GuardError> {
    ctx.cause()?.downcast_ref::<GuardError>().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::types::QueryError;

    fn hook_with_guard() -> QueryHook {
        QueryHook::new(
            Logger::disabled(),
            Some(Arc::new(Guard::new(Logger::disabled(), Vec::new()))),
        )
        .with_styling(false)
    }

    #[test]
    fn test_safe_query_passes_context_through() {
        let hook = hook_with_guard();
        let ctx = OpContext::background();
        let mut event = QueryEvent::new("SELECT * FROM users");

        let out = hook.before(&ctx, &mut event);
        assert!(!out.is_cancelled());
        assert!(blocked_by_guard(&out).is_none());
        assert!(event.stash.is_empty());
    }

    #[test]
    fn test_violation_cancels_and_stashes() {
        let hook = hook_with_guard();
        let ctx = OpContext::background();
        let mut event = QueryEvent::new("DROP TABLE users");

        let out = hook.before(&ctx, &mut event);
        assert!(out.is_cancelled());
        assert!(!ctx.is_cancelled());

        let blocked = blocked_by_guard(&out).unwrap();
        assert_eq!(blocked.violation().unwrap().rule, "no_drop");

        let stashed = event.stash.get::<Arc<GuardError>>().unwrap();
        assert_eq!(stashed.violation().unwrap().statement, "DROP");
    }

    #[test]
    fn test_whitelisted_context_skips_guard() {
        let hook = hook_with_guard();
        let ctx = datagate_core::with_whitelist(&OpContext::background());
        let mut event = QueryEvent::new("DELETE FROM users");

        let out = hook.before(&ctx, &mut event);
        assert!(!out.is_cancelled());
        assert!(out.is_whitelisted());
        assert!(event.stash.is_empty());
    }

    #[test]
    fn test_no_guard_passes_everything() {
        let hook = QueryHook::new(Logger::disabled(), None);
        let mut event = QueryEvent::new("TRUNCATE TABLE users");
        let out = hook.before(&OpContext::background(), &mut event);
        assert!(!out.is_cancelled());
        assert!(hook.guard().is_none());
    }

    #[test]
    fn test_guard_error_wins_over_execution_error() {
        let hook = hook_with_guard();
        let mut event = QueryEvent::new("DROP TABLE users");
        let _ = hook.before(&OpContext::background(), &mut event);
        event.error = Some(QueryError::Execution("connection reset".into()));

        let (severity, error) = outcome(&event, Duration::ZERO);
        let error = error.unwrap();
        assert!(error.contains("no_drop"), "{error}");
        assert!(!error.contains("connection reset"));
        assert_eq!(severity, Severity::Warn);
        hook.after(&event);
    }

    #[test]
    fn test_guard_block_is_at_least_warn() {
        let hook = hook_with_guard();
        let mut event = QueryEvent::new("TRUNCATE TABLE users");
        let _ = hook.before(&OpContext::background(), &mut event);

        assert_eq!(outcome(&event, Duration::ZERO).0, Severity::Warn);
        assert_eq!(outcome(&event, Duration::from_millis(1500)).0, Severity::High);
    }

    #[test]
    fn test_no_rows_is_not_an_error() {
        let mut event = QueryEvent::new("SELECT * FROM users WHERE id = 404");
        event.error = Some(QueryError::NoRows);

        let (severity, error) = outcome(&event, Duration::from_millis(5));
        assert_eq!(error, None);
        assert_eq!(severity, Severity::Low);
    }

    #[test]
    fn test_execution_error_is_reported_at_timing_severity() {
        let mut event = QueryEvent::new("SELECT * FROM missing");
        event.error = Some(QueryError::Execution("no such table: missing".into()));

        let (severity, error) = outcome(&event, Duration::from_millis(250));
        assert_eq!(error.as_deref(), Some("no such table: missing"));
        assert_eq!(severity, Severity::Info);

        let ok = QueryEvent::new("SELECT 1");
        assert_eq!(outcome(&ok, Duration::ZERO), (Severity::Low, None));
    }
}
