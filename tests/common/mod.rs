//! Fixtures and a reference evaluator that runs query trees over in-memory tables.
#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use relational_optimizer::analysis::contains_aggregate;
use relational_optimizer::expr::*;
use relational_optimizer::mapping::{BasicMapping, BasicPolicy, EntityMapping};
use relational_optimizer::optimizer::{OptimizerConfig, OptimizerContext};
use relational_optimizer::scope::declared_aliases;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Record(Vec<(String, Value)>),
    List(Vec<Value>),
}

impl Value {
    fn from_scalar(value: &ScalarValue) -> Self {
        match value {
            ScalarValue::Null => Value::Null,
            ScalarValue::Boolean(v) => Value::Bool(*v),
            ScalarValue::Int(v) => Value::Int(*v),
            ScalarValue::Float(v) => Value::Float(*v),
            ScalarValue::String(v) => Value::Str(v.to_string()),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn items(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            other => panic!("not a list: {:?}", other),
        }
    }

    fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Total order used for sorting; nulls first.
    fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Str(_) => 3,
                Value::Record(_) => 4,
                Value::List(_) => 5,
            }
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (a, b) if rank(a) == 2 && rank(b) == 2 => {
                a.to_float().partial_cmp(&b.to_float()).unwrap_or(Ordering::Equal)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    fn to_float(&self) -> f64 {
        match self {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            _ => f64::NAN,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

pub fn value_record(fields: &[(&str, Value)]) -> Value {
    Value::Record(fields.iter().map(|(n, v)| (n.to_string(), v.clone())).collect())
}

pub type Row = Rc<Vec<(String, Value)>>;

#[derive(Clone, Debug, Default)]
pub struct Database {
    tables: HashMap<String, Vec<Row>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|values| {
                Rc::new(
                    columns
                        .iter()
                        .map(|c| c.to_string())
                        .zip(values)
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        self.tables.insert(name.to_string(), rows);
        self
    }
}

type Binding = Vec<(TableAlias, Row)>;

/// Rows bound to the aliases visible at one point, innermost last.
#[derive(Clone, Debug, Default)]
struct Env {
    bindings: Binding,
}

impl Env {
    fn extend(&self, more: &[(TableAlias, Row)]) -> Env {
        let mut bindings = self.bindings.clone();
        bindings.extend(more.iter().cloned());
        Env { bindings }
    }

    fn lookup(&self, column: &ColumnExpr) -> Value {
        let (_, row) = self
            .bindings
            .iter()
            .rev()
            .find(|(alias, _)| *alias == column.alias)
            .unwrap_or_else(|| panic!("unbound alias {}", column.alias));
        row.iter()
            .find(|(name, _)| *name == column.name)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    }
}

/// Evaluates query trees the way a database plus the client materializer would, one row at a
/// time and without any cleverness. The optimizer must never change what it returns.
pub struct Evaluator<'a> {
    db: &'a Database,
}

impl<'a> Evaluator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn evaluate(&self, expr: &ExprRef) -> Value {
        let env = Env::default();
        match &**expr {
            Expr::Select(s) => Value::List(
                self.select(s, &env)
                    .into_iter()
                    .map(|row| Value::Record((*row).clone()))
                    .collect(),
            ),
            _ => self.scalar(expr, &env, None),
        }
    }

    fn source(&self, expr: &Expr, env: &Env) -> Vec<Binding> {
        match expr {
            Expr::Table(t) => self
                .db
                .tables
                .get(&t.name)
                .unwrap_or_else(|| panic!("no table {}", t.name))
                .iter()
                .map(|row| vec![(t.alias, row.clone())])
                .collect(),
            Expr::Select(s) => self
                .select(s, env)
                .into_iter()
                .map(|row| vec![(s.alias, row)])
                .collect(),
            Expr::Join(j) => self.join(j, env),
            other => panic!("not a row source: {}", other),
        }
    }

    fn join(&self, j: &JoinExpr, env: &Env) -> Vec<Binding> {
        let right_aliases = declared_aliases(&j.right);
        let independent_right = if j.join_type.is_apply() {
            None
        } else {
            Some(self.source(&j.right, env))
        };
        let mut result = Vec::new();
        for left in self.source(&j.left, env) {
            let rights = match &independent_right {
                Some(rights) => rights.clone(),
                None => self.source(&j.right, &env.extend(&left)),
            };
            let mut matched = false;
            for right in rights {
                let mut binding = left.clone();
                binding.extend(right);
                let keep = match &j.condition {
                    Some(condition) => {
                        self.scalar(condition, &env.extend(&binding), None).is_true()
                    }
                    None => true,
                };
                if keep {
                    matched = true;
                    result.push(binding);
                }
            }
            let outer = matches!(
                j.join_type,
                JoinType::LeftOuter | JoinType::SingletonLeftOuter | JoinType::OuterApply
            );
            if !matched && outer {
                let mut binding = left.clone();
                binding.extend(right_aliases.iter().map(|a| (*a, Rc::new(vec![]))));
                result.push(binding);
            }
        }
        result
    }

    fn select(&self, s: &SelectExpr, env: &Env) -> Vec<Row> {
        let mut bindings = self.source(&s.from, env);
        if let Some(filter) = &s.filter {
            bindings.retain(|b| self.scalar(filter, &env.extend(b), None).is_true());
        }

        let aggregated =
            !s.group_by.is_empty() || s.columns.iter().any(|c| contains_aggregate(&c.expr));
        let groups: Vec<(Env, Option<Vec<Env>>)> = if aggregated {
            let mut groups: Vec<(Vec<Value>, Vec<Env>)> = Vec::new();
            for binding in &bindings {
                let scope = env.extend(binding);
                let key: Vec<Value> =
                    s.group_by.iter().map(|g| self.scalar(g, &scope, None)).collect();
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, members)) => members.push(scope),
                    None => groups.push((key, vec![scope])),
                }
            }
            if groups.is_empty() && s.group_by.is_empty() {
                groups.push((vec![], vec![]));
            }
            groups
                .into_iter()
                .map(|(_, members)| {
                    let first = members.first().cloned().unwrap_or_else(|| env.clone());
                    (first, Some(members))
                })
                .collect()
        } else {
            bindings.iter().map(|b| (env.extend(b), None)).collect()
        };

        let mut rows: Vec<(Row, Vec<Value>)> = groups
            .iter()
            .map(|(scope, members)| {
                let group = members.as_deref();
                let row = s
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), self.scalar(&c.expr, scope, group)))
                    .collect();
                let keys = s.order_by.iter().map(|o| self.scalar(&o.expr, scope, group)).collect();
                (Rc::new(row), keys)
            })
            .collect();

        rows.sort_by(|(_, a), (_, b)| {
            s.order_by
                .iter()
                .zip(a.iter().zip(b))
                .map(|(o, (x, y))| match o.direction {
                    OrderDirection::Ascending => x.sort_cmp(y),
                    OrderDirection::Descending => y.sort_cmp(x),
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        if s.reverse {
            rows.reverse();
        }
        let mut rows: Vec<Row> = rows.into_iter().map(|(row, _)| row).collect();
        if s.distinct {
            let mut seen: Vec<Row> = Vec::new();
            rows.retain(|row| {
                if seen.contains(row) {
                    false
                } else {
                    seen.push(row.clone());
                    true
                }
            });
        }
        let skip = s.skip.as_ref().map(|e| self.count(e, env)).unwrap_or(0);
        let take = s.take.as_ref().map(|e| self.count(e, env)).unwrap_or(usize::MAX);
        rows.into_iter().skip(skip).take(take).collect()
    }

    fn count(&self, expr: &ExprRef, env: &Env) -> usize {
        self.scalar(expr, env, None)
            .as_int()
            .map(|v| v.max(0) as usize)
            .unwrap_or(0)
    }

    fn scalar(&self, expr: &ExprRef, scope: &Env, group: Option<&[Env]>) -> Value {
        match &**expr {
            Expr::Column(c) => scope.lookup(c),
            Expr::Literal(v) => Value::from_scalar(v),
            Expr::Binary(b) => binary(
                b.op,
                self.scalar(&b.left, scope, group),
                self.scalar(&b.right, scope, group),
            ),
            Expr::Unary(u) => {
                let v = self.scalar(&u.expr, scope, group);
                match (u.op, v) {
                    (UnaryOp::IsNull, v) => Value::Bool(v == Value::Null),
                    (UnaryOp::IsNotNull, v) => Value::Bool(v != Value::Null),
                    (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
                    (UnaryOp::Negate, Value::Int(i)) => Value::Int(-i),
                    (UnaryOp::Negate, Value::Float(f)) => Value::Float(-f),
                    _ => Value::Null,
                }
            }
            Expr::Aggregate(a) => {
                let group = group.unwrap_or_else(|| panic!("aggregate outside a group"));
                self.aggregate(a, group)
            }
            Expr::Subquery(q) => {
                let select = q
                    .select
                    .as_select()
                    .unwrap_or_else(|| panic!("subquery over a non-select"));
                let rows = self.select(select, scope);
                let first = |row: &Row| row.first().map(|(_, v)| v.clone()).unwrap_or(Value::Null);
                match &q.kind {
                    SubqueryKind::Scalar => rows.first().map(first).unwrap_or(Value::Null),
                    SubqueryKind::Exists => Value::Bool(!rows.is_empty()),
                    SubqueryKind::In { operand } => {
                        let v = self.scalar(operand, scope, group);
                        Value::Bool(rows.iter().any(|row| first(row) == v))
                    }
                }
            }
            Expr::OuterJoined(o) => match self.scalar(&o.test, scope, group) {
                Value::Null => Value::Null,
                _ => self.scalar(&o.expr, scope, group),
            },
            Expr::Entity(e) => Value::Record(self.fields(&e.fields, scope, group)),
            Expr::Record(r) => Value::Record(self.fields(&r.fields, scope, group)),
            Expr::ClientProjection(p) => self.projection(p, scope),
            Expr::ClientJoin(j) => self.client_join(j, scope),
            other => panic!("cannot evaluate {}", other),
        }
    }

    fn fields(
        &self,
        fields: &[FieldBinding],
        scope: &Env,
        group: Option<&[Env]>,
    ) -> Vec<(String, Value)> {
        fields
            .iter()
            .map(|f| (f.member.clone(), self.scalar(&f.expr, scope, group)))
            .collect()
    }

    fn aggregate(&self, a: &AggregateExpr, members: &[Env]) -> Value {
        let argument = match &a.argument {
            None => return Value::Int(members.len() as i64),
            Some(argument) => argument,
        };
        let mut values: Vec<Value> = members
            .iter()
            .map(|m| self.scalar(argument, m, None))
            .filter(|v| *v != Value::Null)
            .collect();
        if a.distinct {
            let mut seen = Vec::new();
            values.retain(|v| {
                if seen.contains(v) {
                    false
                } else {
                    seen.push(v.clone());
                    true
                }
            });
        }
        match a.function {
            AggregateFunction::Count => Value::Int(values.len() as i64),
            _ if values.is_empty() => Value::Null,
            AggregateFunction::Sum => values
                .into_iter()
                .fold(Value::Int(0), |acc, v| binary(BinaryOp::Add, acc, v)),
            AggregateFunction::Min => values
                .into_iter()
                .min_by(|x, y| x.sort_cmp(y))
                .unwrap_or(Value::Null),
            AggregateFunction::Max => values
                .into_iter()
                .max_by(|x, y| x.sort_cmp(y))
                .unwrap_or(Value::Null),
            AggregateFunction::Avg => {
                let n = values.len() as f64;
                Value::Float(values.iter().map(Value::to_float).sum::<f64>() / n)
            }
        }
    }

    /// `None` for rows where an outer join found nothing to project.
    fn project(&self, projector: &ExprRef, scope: &Env) -> Option<Value> {
        if let Expr::OuterJoined(o) = &**projector {
            if self.scalar(&o.test, scope, None) == Value::Null {
                return None;
            }
        }
        Some(self.scalar(projector, scope, None))
    }

    fn projection(&self, p: &ClientProjectionExpr, scope: &Env) -> Value {
        let select = p.select().unwrap_or_else(|| panic!("projection over a non-select"));
        let values = self
            .select(select, scope)
            .into_iter()
            .filter_map(|row| self.project(&p.projector, &scope.extend(&[(select.alias, row)])))
            .collect();
        fold(p.aggregator, values)
    }

    fn client_join(&self, j: &ClientJoinExpr, scope: &Env) -> Value {
        let p = j
            .projection
            .as_client_projection()
            .unwrap_or_else(|| panic!("client join over a non-projection"));
        let select = p.select().unwrap_or_else(|| panic!("projection over a non-select"));
        let outer_key: Vec<Value> =
            j.outer_key.iter().map(|k| self.scalar(k, scope, None)).collect();
        let values = self
            .select(select, &Env::default())
            .into_iter()
            .filter_map(|row| {
                let inner = scope.extend(&[(select.alias, row)]);
                let key: Vec<Value> =
                    j.inner_key.iter().map(|k| self.scalar(k, &inner, None)).collect();
                if key != outer_key || key.contains(&Value::Null) {
                    return None;
                }
                self.project(&p.projector, &inner)
            })
            .collect();
        fold(p.aggregator, values)
    }
}

fn fold(aggregator: Aggregator, values: Vec<Value>) -> Value {
    match aggregator {
        Aggregator::List => Value::List(values),
        Aggregator::Single | Aggregator::FirstOrDefault => {
            values.into_iter().next().unwrap_or(Value::Null)
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Value {
    match op {
        BinaryOp::And => match (left, right) {
            (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
            (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
            _ => Value::Null,
        },
        BinaryOp::Or => match (left, right) {
            (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
            (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
            _ => Value::Null,
        },
        _ if left == Value::Null || right == Value::Null => Value::Null,
        BinaryOp::Eq => Value::Bool(left.sort_cmp(&right) == Ordering::Equal),
        BinaryOp::NotEq => Value::Bool(left.sort_cmp(&right) != Ordering::Equal),
        BinaryOp::Lt => Value::Bool(left.sort_cmp(&right) == Ordering::Less),
        BinaryOp::LtEq => Value::Bool(left.sort_cmp(&right) != Ordering::Greater),
        BinaryOp::Gt => Value::Bool(left.sort_cmp(&right) == Ordering::Greater),
        BinaryOp::GtEq => Value::Bool(left.sort_cmp(&right) != Ordering::Less),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => match (left, right) {
            (Value::Int(a), Value::Int(b)) => match op {
                BinaryOp::Add => Value::Int(a + b),
                BinaryOp::Sub => Value::Int(a - b),
                BinaryOp::Mul => Value::Int(a * b),
                _ if b == 0 => Value::Null,
                _ => Value::Int(a / b),
            },
            (a, b) => {
                let (a, b) = (a.to_float(), b.to_float());
                Value::Float(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    _ => a / b,
                })
            }
        },
    }
}

/// Customers with an embedded address and a collection of orders; every order has one customer.
pub fn sample_mapping() -> BasicMapping {
    BasicMapping::new()
        .with_entity(
            EntityMapping::new("Customer", "Customers")
                .key("id", DataType::Int64)
                .column("name", DataType::String)
                .nested("address", "Address")
                .relationship("orders", "Order", &["id"], &["customer_id"], false),
        )
        .with_entity(
            EntityMapping::new("Address", "Customers")
                .column("city", DataType::String)
                .column("zip", DataType::String),
        )
        .with_entity(
            EntityMapping::new("Order", "Orders")
                .key("id", DataType::Int64)
                .column("customer_id", DataType::Int64)
                .column("total", DataType::Int64)
                .relationship("customer", "Customer", &["customer_id"], &["id"], true),
        )
}

/// Rows for [`sample_mapping`]. Customer 3 has no known name or address, dave has no orders, and
/// order 13 belongs to a customer that does not exist.
pub fn sample_database() -> Database {
    Database::new()
        .with_table(
            "Customers",
            &["id", "name", "city", "zip"],
            vec![
                vec![1.into(), "alice".into(), "Oslo".into(), "0150".into()],
                vec![2.into(), "bob".into(), "Bergen".into(), "5003".into()],
                vec![3.into(), Value::Null, Value::Null, Value::Null],
                vec![5.into(), "dave".into(), "Paris".into(), "75001".into()],
            ],
        )
        .with_table(
            "Orders",
            &["id", "customer_id", "total"],
            vec![
                vec![10.into(), 1.into(), 100.into()],
                vec![11.into(), 1.into(), 250.into()],
                vec![12.into(), 2.into(), 75.into()],
                vec![13.into(), 4.into(), 30.into()],
                vec![14.into(), 3.into(), 5.into()],
            ],
        )
}

pub fn context(policy: BasicPolicy) -> OptimizerContext {
    OptimizerContext::new(Rc::new(sample_mapping()), Rc::new(policy))
        .with_config(OptimizerConfig::default().with_validate_references(true))
}

pub fn entity_query(entity: &str) -> ExprRef {
    use relational_optimizer::mapping::QueryMapping;

    let query = sample_mapping()
        .entity_query(&EntityDescriptor::new(entity))
        .unwrap_or_else(|e| panic!("no query for {}: {}", entity, e));
    Expr::ClientProjection(query).into_ref()
}

/// Whether any node below `expr` satisfies `pred`.
pub fn contains(expr: &ExprRef, mut pred: impl FnMut(&Expr) -> bool) -> bool {
    expr.any(&mut pred)
}
