use std::rc::Rc;

use strum_macros::{AsRefStr, Display};

use crate::expr::{EntityDescriptor, ExprRef, TableAlias};

/// Column type as the database sees it.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Decimal,
    String,
    DateTime,
    Binary,
    Guid,
    /// A value that is not a scalar, e.g. an entity or a collection in a projector.
    Unknown,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Unknown,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int(_) => DataType::Int64,
            ScalarValue::Float(_) => DataType::Float64,
            ScalarValue::String(_) => DataType::String,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// A reference to a column declared by `alias`. Never a declaration itself.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnExpr {
    pub alias: TableAlias,
    pub name: String,
    pub data_type: DataType,
}

impl ColumnExpr {
    pub fn new<S: Into<String>>(alias: TableAlias, name: S, data_type: DataType) -> Self {
        Self {
            alias,
            name: name.into(),
            data_type,
        }
    }

    /// Same column name and type, declared by another alias.
    pub fn with_alias(&self, alias: TableAlias) -> Self {
        Self {
            alias,
            name: self.name.clone(),
            data_type: self.data_type,
        }
    }
}

/// A named query parameter supplied at execution time.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterExpr {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Clone, Copy, Debug, Display, AsRefStr, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    #[strum(to_string = "=")]
    Eq,
    #[strum(to_string = "<>")]
    NotEq,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    LtEq,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    GtEq,
    #[strum(to_string = "AND")]
    And,
    #[strum(to_string = "OR")]
    Or,
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Sub,
    #[strum(to_string = "*")]
    Mul,
    #[strum(to_string = "/")]
    Div,
}

impl BinaryOp {
    pub fn is_predicate(&self) -> bool {
        !matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: ExprRef,
    pub right: ExprRef,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    #[strum(to_string = "NOT")]
    Not,
    #[strum(to_string = "-")]
    Negate,
    #[strum(to_string = "IS NULL")]
    IsNull,
    #[strum(to_string = "IS NOT NULL")]
    IsNotNull,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub expr: ExprRef,
}

/// A deterministic scalar function call, evaluated by the database.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionExpr {
    pub name: String,
    pub args: Vec<ExprRef>,
    pub data_type: DataType,
}

#[derive(Clone, Copy, Debug, Display, AsRefStr, PartialEq, Eq, Hash)]
#[strum(serialize_all = "UPPERCASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    /// `None` only for `COUNT(*)`.
    pub argument: Option<ExprRef>,
    pub distinct: bool,
    pub data_type: DataType,
}

impl AggregateExpr {
    pub fn is_count_star(&self) -> bool {
        self.function == AggregateFunction::Count && self.argument.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubqueryKind {
    /// Single row, single column.
    Scalar,
    Exists,
    /// `operand IN (select ...)`; the select has exactly one column.
    In { operand: ExprRef },
}

/// A correlated subquery evaluated per outer row. `select` is always a select node.
#[derive(Clone, Debug, PartialEq)]
pub struct SubqueryExpr {
    pub kind: SubqueryKind,
    pub select: ExprRef,
    pub data_type: DataType,
}

/// `expr` guarded by `test`: after an outer join, a null `test` means the right side had no
/// matching row, as opposed to a matching row whose fields are null.
#[derive(Clone, Debug, PartialEq)]
pub struct OuterJoinedExpr {
    pub test: ExprRef,
    pub expr: ExprRef,
}

/// Unbound access of `member` on an entity-typed value. Relationship binding resolves these.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberExpr {
    pub expr: ExprRef,
    pub member: String,
}

/// Which relationship a nested projection was materialized from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelationshipOrigin {
    pub entity: EntityDescriptor,
    pub member: String,
}
