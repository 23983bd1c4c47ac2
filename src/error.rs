//! Error types of the optimizer.
//!
//! Rewrite passes never fail: a pass whose precondition does not hold leaves the tree unchanged.
//! Errors only come from the mapping collaborator, from dependency ordering of multi-table
//! entities, and from the reference validation the driver runs after structural passes.

use thiserror::Error;

use crate::expr::TableAlias;

pub type OptResult<T> = anyhow::Result<T>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptError {
    /// A pass produced a tree with a dangling or duplicated reference. This is always an
    /// optimizer defect, never a user error.
    #[error("rule {rule} produced an invalid tree: {source}")]
    InvalidReference {
        rule: String,
        #[source]
        source: ReferenceError,
    },
    #[error("mapping of entity {entity} is inconsistent: {reason}")]
    InconsistentMapping { entity: String, reason: String },
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    #[error("entity {entity} has no member {member}")]
    UnknownMember { entity: String, member: String },
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Reported by the validity checker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("column {alias}.{column} references an alias that is not in scope")]
    UnknownAlias { alias: TableAlias, column: String },
    #[error("column {alias}.{column} is not declared by {alias}")]
    UnknownColumn { alias: TableAlias, column: String },
    #[error("alias {0} is declared more than once")]
    DuplicateAlias(TableAlias),
    #[error("variable {0} is used before it is declared")]
    UndeclaredVariable(String),
}
