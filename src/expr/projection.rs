use std::fmt;
use std::rc::Rc;

use crate::expr::{Expr, ExprRef, RelationshipOrigin, SelectExpr};

/// Names a mapped entity type. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityDescriptor {
    name: Rc<str>,
}

impl EntityDescriptor {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Self {
            name: Rc::from(name.as_ref()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldBinding {
    pub member: String,
    pub expr: ExprRef,
}

impl FieldBinding {
    pub fn new<S: Into<String>>(member: S, expr: ExprRef) -> Self {
        Self {
            member: member.into(),
            expr,
        }
    }
}

/// Projector form building one instance of a mapped entity from row values.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityExpr {
    pub entity: EntityDescriptor,
    pub fields: Vec<FieldBinding>,
}

impl EntityExpr {
    pub fn field(&self, member: &str) -> Option<&ExprRef> {
        self.fields.iter().find(|f| f.member == member).map(|f| &f.expr)
    }
}

/// Anonymous projector shape.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordExpr {
    pub fields: Vec<FieldBinding>,
}

/// How rows of a client projection fold into a result value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aggregator {
    List,
    Single,
    FirstOrDefault,
}

/// A select paired with the projector that turns each of its rows into a value.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientProjectionExpr {
    /// Always a select node.
    pub select: ExprRef,
    pub projector: ExprRef,
    pub aggregator: Aggregator,
    pub origin: Option<RelationshipOrigin>,
}

impl ClientProjectionExpr {
    pub fn new(select: SelectExpr, projector: ExprRef, aggregator: Aggregator) -> Self {
        Self {
            select: Rc::new(Expr::Select(select)),
            projector,
            aggregator,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<RelationshipOrigin>) -> Self {
        self.origin = origin;
        self
    }

    pub fn select(&self) -> Option<&SelectExpr> {
        self.select.as_select()
    }

    pub fn is_singleton(&self) -> bool {
        self.aggregator != Aggregator::List
    }
}

/// A nested projection executed as a second query and matched to outer rows in memory by
/// comparing `outer_key` against `inner_key`.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientJoinExpr {
    /// Always a client projection node.
    pub projection: ExprRef,
    /// Evaluated against the outer row.
    pub outer_key: Vec<ExprRef>,
    /// Evaluated against rows of `projection`'s select.
    pub inner_key: Vec<ExprRef>,
}
