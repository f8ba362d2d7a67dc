// SPDX-License-Identifier: Apache-2.0

// Datasource engine
// Provider lookup and the instrumented database handle

pub mod database;
pub mod registry;

pub use database::{guard_error, is_no_rows, Database, DatabaseBuilder};
pub use registry::ProviderRegistry;
