//! SQL generation module.
//!
//! A small typed builder the compiler assembles statements with:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder helpers
//! - [`token`] - Token types for SQL generation

pub mod expr;
pub mod query;
pub mod token;


pub use expr::{
    and_all, col, or_all, paren, raw_sql, table_col, BinaryOperator, Expr, ExprExt,
};
pub use query::{Join, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{quote_string, Token, TokenStream};
