// SPDX-License-Identifier: Apache-2.0

//! Scoped logger handed to the guard, the query hook and the lifecycle hooks.
//!
//! Events are ordinary `tracing` events emitted inside the logger's span, so
//! the subscriber installed by the host decides where they go.

use tracing::Span;

#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    pub fn new(component: &str) -> Self {
        Self {
            span: tracing::info_span!("datagate", component = %component),
        }
    }

    /// A logger whose span records nothing. Events still reach the
    /// subscriber, just without the component field.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Derives a logger for a sub-component, nested under this one.
    pub fn named(&self, component: &str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "datagate", component = %component),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn in_scope<F: FnOnce() -> T, T>(&self, f: F) -> T {
        self.span.in_scope(f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("datasource")
    }
}

impl From<Span> for Logger {
    fn from(span: Span) -> Self {
        Self { span }
    }
}
