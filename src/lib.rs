//! # Quarry
//!
//! A schema-driven compiler from collection models to injection-safe SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Model document (JSON)                       │
//! │  (collections, fields, field-sets, custom queries, hooks)│
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [model::loader + field registry]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Model (read-only)                       │
//! └─────────────────────────────────────────────────────────┘
//!                          │  QueryConditions
//!                          ▼ [compile: alias graph, projection, conditions]
//! ┌─────────────────────────────────────────────────────────┐
//! │                    SQL Query                             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [exec: pool → connection → rows]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Rows keyed by field path                    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod compile;
pub mod config;
pub mod error;
pub mod exec;
pub mod field;
pub mod model;
pub mod sql;

pub use compile::{compile, CompileError, CompiledQuery, QueryConditions};
pub use error::{QueryError, QueryResult};
pub use exec::{ExecError, ExecResult, Row};
pub use model::{LoadError, Model};
