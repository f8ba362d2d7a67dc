// SPDX-License-Identifier: Apache-2.0

//! Datagate SQL Guard
//!
//! Parses SQL text into an AST and runs an ordered list of [`Rule`]s over
//! it. The first rule that reports a [`Violation`] blocks the statement.
//! Input the parser cannot understand is allowed through.

pub mod error;
pub mod guard;
pub mod rules;
pub mod violation;

pub use error::{GuardError, GuardErrorKind};
pub use guard::Guard;
pub use rules::{default_rules, DeleteRequiresWhere, NoDrop, NoTruncate, Rule};
pub use violation::Violation;
