// SPDX-License-Identifier: Apache-2.0

//! Query Interceptor
//!
//! Wraps every query issued through [`crate::Database`]:
//! - **Safety**: the SQL guard runs before execution unless the context is whitelisted
//! - **Timing**: elapsed time is classified and logged as one styled line after execution

pub mod pipeline;
pub mod profiling;
pub mod types;

pub use pipeline::{blocked_by_guard, QueryHook};
pub use profiling::{normalize_sql, Severity};
pub use types::{OperationKind, QueryError, QueryEvent, Stash};
