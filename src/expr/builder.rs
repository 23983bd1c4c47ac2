//! Constructors for query trees.

use std::rc::Rc;

use crate::expr::*;

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int(v as i64)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(Rc::from(v))
    }
}

/// A table with a fresh alias.
pub fn table<S: Into<String>>(name: S) -> ExprRef {
    Expr::Table(TableExpr::new(TableAlias::new(), None, name)).into_ref()
}

/// A table of a mapped entity with a fresh alias.
pub fn entity_table<S: Into<String>>(entity: &EntityDescriptor, name: S) -> ExprRef {
    Expr::Table(TableExpr::new(TableAlias::new(), Some(entity.clone()), name)).into_ref()
}

pub fn col<S: Into<String>>(alias: TableAlias, name: S, data_type: DataType) -> ExprRef {
    Expr::Column(ColumnExpr::new(alias, name, data_type)).into_ref()
}

pub fn lit<V: Into<ScalarValue>>(value: V) -> ExprRef {
    Expr::Literal(value.into()).into_ref()
}

pub fn null() -> ExprRef {
    Expr::Literal(ScalarValue::Null).into_ref()
}

pub fn param<S: Into<String>>(name: S, data_type: DataType) -> ExprRef {
    Expr::Parameter(ParameterExpr {
        name: name.into(),
        data_type,
    })
    .into_ref()
}

pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
    Expr::Binary(BinaryExpr { op, left, right }).into_ref()
}

pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::Eq, left, right)
}

pub fn and(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::And, left, right)
}

pub fn or(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOp::Or, left, right)
}

pub fn unary(op: UnaryOp, expr: ExprRef) -> ExprRef {
    Expr::Unary(UnaryExpr { op, expr }).into_ref()
}

/// Left-deep `AND` of all predicates, `None` when there are none.
pub fn conjunction<I>(predicates: I) -> Option<ExprRef>
where
    I: IntoIterator<Item = ExprRef>,
{
    predicates.into_iter().reduce(and)
}

/// Folds literal integer additions, used for `skip + take`.
pub fn add(left: ExprRef, right: ExprRef) -> ExprRef {
    match (&*left, &*right) {
        (Expr::Literal(ScalarValue::Int(l)), Expr::Literal(ScalarValue::Int(r))) => lit(l + r),
        _ => binary(BinaryOp::Add, left, right),
    }
}

pub fn function<S: Into<String>>(name: S, args: Vec<ExprRef>, data_type: DataType) -> ExprRef {
    Expr::Function(FunctionExpr {
        name: name.into(),
        args,
        data_type,
    })
    .into_ref()
}

pub fn aggregate(function: AggregateFunction, argument: ExprRef, data_type: DataType) -> ExprRef {
    Expr::Aggregate(AggregateExpr {
        function,
        argument: Some(argument),
        distinct: false,
        data_type,
    })
    .into_ref()
}

pub fn count_star() -> ExprRef {
    Expr::Aggregate(AggregateExpr {
        function: AggregateFunction::Count,
        argument: None,
        distinct: false,
        data_type: DataType::Int64,
    })
    .into_ref()
}

pub fn scalar_subquery(select: SelectExpr) -> ExprRef {
    let data_type = select
        .columns
        .first()
        .map(|c| c.data_type)
        .unwrap_or(DataType::Unknown);
    Expr::Subquery(SubqueryExpr {
        kind: SubqueryKind::Scalar,
        select: Expr::Select(select).into_ref(),
        data_type,
    })
    .into_ref()
}

pub fn exists(select: SelectExpr) -> ExprRef {
    Expr::Subquery(SubqueryExpr {
        kind: SubqueryKind::Exists,
        select: Expr::Select(select).into_ref(),
        data_type: DataType::Boolean,
    })
    .into_ref()
}

pub fn in_subquery(operand: ExprRef, select: SelectExpr) -> ExprRef {
    Expr::Subquery(SubqueryExpr {
        kind: SubqueryKind::In { operand },
        select: Expr::Select(select).into_ref(),
        data_type: DataType::Boolean,
    })
    .into_ref()
}

pub fn join(
    join_type: JoinType,
    left: ExprRef,
    right: ExprRef,
    condition: Option<ExprRef>,
) -> ExprRef {
    Expr::Join(JoinExpr::new(join_type, left, right, condition)).into_ref()
}

pub fn member<S: Into<String>>(expr: ExprRef, member: S) -> ExprRef {
    Expr::Member(MemberExpr {
        expr,
        member: member.into(),
    })
    .into_ref()
}

pub fn entity(entity: &EntityDescriptor, fields: Vec<FieldBinding>) -> ExprRef {
    Expr::Entity(EntityExpr {
        entity: entity.clone(),
        fields,
    })
    .into_ref()
}

pub fn record(fields: Vec<FieldBinding>) -> ExprRef {
    Expr::Record(RecordExpr { fields }).into_ref()
}

pub fn projection(select: SelectExpr, projector: ExprRef, aggregator: Aggregator) -> ExprRef {
    Expr::ClientProjection(ClientProjectionExpr::new(select, projector, aggregator)).into_ref()
}

/// A column reference to every column of `select`, keyed by the declared names.
pub fn columns_of(select: &SelectExpr) -> Vec<ExprRef> {
    select
        .columns
        .iter()
        .map(|c| col(select.alias, c.name.clone(), c.data_type))
        .collect()
}

/// Incrementally builds a [`SelectExpr`].
pub struct SelectBuilder {
    select: SelectExpr,
}

impl SelectBuilder {
    /// A select with a fresh alias.
    pub fn new(from: ExprRef) -> Self {
        Self::with_alias(TableAlias::new(), from)
    }

    pub fn with_alias(alias: TableAlias, from: ExprRef) -> Self {
        Self {
            select: SelectExpr::new(alias, vec![], from),
        }
    }

    pub fn alias(&self) -> TableAlias {
        self.select.alias
    }

    pub fn column<S: Into<String>>(mut self, name: S, expr: ExprRef) -> Self {
        let data_type = expr.data_type();
        self.select
            .columns
            .push(ColumnDeclaration::new(name, expr, data_type));
        self
    }

    /// Adds `predicate`, ANDed with any filter added before.
    pub fn filter(mut self, predicate: ExprRef) -> Self {
        self.select.filter = Some(match self.select.filter.take() {
            Some(existing) => and(existing, predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, direction: OrderDirection, expr: ExprRef) -> Self {
        self.select.order_by.push(OrderExpr::new(direction, expr));
        self
    }

    pub fn group_by(mut self, expr: ExprRef) -> Self {
        self.select.group_by.push(expr);
        self
    }

    pub fn skip(mut self, skip: ExprRef) -> Self {
        self.select.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: ExprRef) -> Self {
        self.select.take = Some(take);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.select.distinct = true;
        self
    }

    pub fn reverse(mut self) -> Self {
        self.select.reverse = true;
        self
    }

    pub fn build(self) -> SelectExpr {
        self.select
    }

    pub fn build_ref(self) -> ExprRef {
        Expr::Select(self.select).into_ref()
    }
}
