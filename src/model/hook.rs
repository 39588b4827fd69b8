//! Mutation hooks.
//!
//! A hook is attached to a collection and fires when a write path reports
//! that `when.field` saw the event `when.what`. Each hook carries exactly one
//! action, dispatched by [`Hook::fire`].

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{CustomQuery, PRIMARY_KEY};
use crate::error::QueryError;
use crate::exec::{ExecError, ExecResult, Pool, Row};

/// Trigger predicate of a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookWhen {
    pub field: String,
    pub what: String,
}

/// Outbound email instruction. Delivery belongs to a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEmail {
    pub recipient: String,
    pub template: String,
}

/// The single action a hook performs.
#[derive(Debug, Clone)]
pub enum HookAction {
    /// Assign literal values to fields of the record being written.
    Set(Map<String, Value>),
    /// Ask the mailer to send a templated email.
    Email(HookEmail),
    /// Run a custom query.
    Query(Arc<CustomQuery>),
}

impl HookAction {
    pub fn kind(&self) -> &'static str {
        match self {
            HookAction::Set(_) => "set",
            HookAction::Email(_) => "email",
            HookAction::Query(_) => "raw",
        }
    }
}

/// A collection-bound trigger.
#[derive(Debug, Clone)]
pub struct Hook {
    pub collection: String,
    pub when: HookWhen,
    pub action: HookAction,
}

/// What a fired hook did.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// Names of the record fields that were assigned.
    Assigned(Vec<String>),
    Emailed { recipient: String },
    Queried(Vec<Row>),
}

/// Outbound email delivery.
pub trait Mailer {
    fn send(
        &self,
        recipient: &str,
        template: &str,
        record: &Row,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl Hook {
    pub fn matches(&self, field: &str, what: &str) -> bool {
        self.when.field == field && self.when.what == what
    }

    /// Perform this hook's action against `record`, the row being written.
    pub fn fire(
        &self,
        record: &mut Row,
        pool: &dyn Pool,
        mailer: &dyn Mailer,
    ) -> ExecResult<HookOutcome> {
        debug!(
            collection = %self.collection,
            field = %self.when.field,
            what = %self.when.what,
            action = self.action.kind(),
            "firing hook"
        );

        match &self.action {
            HookAction::Set(assignments) => {
                for (name, value) in assignments {
                    record.insert(name.clone(), value.clone());
                }
                Ok(HookOutcome::Assigned(assignments.keys().cloned().collect()))
            }
            HookAction::Email(email) => {
                mailer
                    .send(&email.recipient, &email.template, record)
                    .map_err(ExecError::Mail)?;
                Ok(HookOutcome::Emailed {
                    recipient: email.recipient.clone(),
                })
            }
            HookAction::Query(query) => {
                let inputs = query
                    .parameters
                    .iter()
                    .map(|param| {
                        let key = param.bind.as_deref().unwrap_or(PRIMARY_KEY);
                        record
                            .get(key)
                            .cloned()
                            .ok_or_else(|| QueryError::UnboundRecordField(key.to_string()))
                    })
                    .collect::<Result<Vec<Value>, _>>()?;
                let rows = query.run(pool, &inputs)?;
                Ok(HookOutcome::Queried(rows))
            }
        }
    }
}
