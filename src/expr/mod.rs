//! Relational expression model.
//!
//! A query is a tree of [`Expr`] nodes shared through [`ExprRef`]. Nodes are immutable: a rewrite
//! builds new nodes along the changed path and shares every unchanged subtree with the input.
//! Row sources are identified by [`TableAlias`], whose equality is identity, never the name it
//! prints as.

use std::rc::Rc;

use derive_more::From;
use enum_as_inner::EnumAsInner;

mod alias;
pub use alias::*;
mod builder;
pub use builder::*;
mod command;
pub use command::*;
mod compare;
pub use compare::*;
mod display;
mod projection;
pub use projection::*;
mod relation;
pub use relation::*;
mod rewrite;
pub use rewrite::*;
mod scalar;
pub use scalar::*;

pub type ExprRef = Rc<Expr>;

/// One node of a query tree.
#[derive(Clone, Debug, PartialEq, EnumAsInner, From)]
pub enum Expr {
    // Row sources.
    Table(TableExpr),
    Select(SelectExpr),
    Join(JoinExpr),

    // Scalars.
    Column(ColumnExpr),
    Literal(ScalarValue),
    Parameter(ParameterExpr),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Function(FunctionExpr),
    Aggregate(AggregateExpr),
    Subquery(SubqueryExpr),
    OuterJoined(OuterJoinedExpr),
    Variable(VariableExpr),

    // Projector forms, evaluated on the client.
    Member(MemberExpr),
    Entity(EntityExpr),
    Record(RecordExpr),
    ClientProjection(ClientProjectionExpr),
    ClientJoin(ClientJoinExpr),

    // Commands.
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
    Block(BlockCommand),
    If(IfCommand),
    Declaration(DeclarationCommand),
}

impl Expr {
    pub fn into_ref(self) -> ExprRef {
        Rc::new(self)
    }

    /// Alias declared by this node itself, for tables and selects.
    pub fn declared_alias(&self) -> Option<TableAlias> {
        match self {
            Expr::Table(t) => Some(t.alias),
            Expr::Select(s) => Some(s.alias),
            _ => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Column(c) => c.data_type,
            Expr::Literal(v) => v.data_type(),
            Expr::Parameter(p) => p.data_type,
            Expr::Binary(b) if b.op.is_predicate() => DataType::Boolean,
            Expr::Binary(b) => b.left.data_type(),
            Expr::Unary(u) => match u.op {
                UnaryOp::Negate => u.expr.data_type(),
                _ => DataType::Boolean,
            },
            Expr::Function(f) => f.data_type,
            Expr::Aggregate(a) => a.data_type,
            Expr::Subquery(s) => s.data_type,
            Expr::OuterJoined(o) => o.expr.data_type(),
            Expr::Variable(v) => v.data_type,
            _ => DataType::Unknown,
        }
    }

    /// Direct children in canonical order.
    ///
    /// Select: from, filter, columns, order by, group by, skip, take. Join: left, right,
    /// condition. Projection: select, projector. Client join: projection, outer key, inner key.
    pub fn children(&self) -> Vec<&ExprRef> {
        let mut children = Vec::new();
        match self {
            Expr::Table(_)
            | Expr::Column(_)
            | Expr::Literal(_)
            | Expr::Parameter(_)
            | Expr::Variable(_) => {}
            Expr::Select(s) => {
                children.push(&s.from);
                children.extend(s.filter.iter());
                children.extend(s.columns.iter().map(|c| &c.expr));
                children.extend(s.order_by.iter().map(|o| &o.expr));
                children.extend(s.group_by.iter());
                children.extend(s.skip.iter());
                children.extend(s.take.iter());
            }
            Expr::Join(j) => {
                children.push(&j.left);
                children.push(&j.right);
                children.extend(j.condition.iter());
            }
            Expr::Binary(b) => {
                children.push(&b.left);
                children.push(&b.right);
            }
            Expr::Unary(u) => children.push(&u.expr),
            Expr::Function(f) => children.extend(f.args.iter()),
            Expr::Aggregate(a) => children.extend(a.argument.iter()),
            Expr::Subquery(s) => {
                if let SubqueryKind::In { operand } = &s.kind {
                    children.push(operand);
                }
                children.push(&s.select);
            }
            Expr::OuterJoined(o) => {
                children.push(&o.test);
                children.push(&o.expr);
            }
            Expr::Member(m) => children.push(&m.expr),
            Expr::Entity(e) => children.extend(e.fields.iter().map(|f| &f.expr)),
            Expr::Record(r) => children.extend(r.fields.iter().map(|f| &f.expr)),
            Expr::ClientProjection(p) => {
                children.push(&p.select);
                children.push(&p.projector);
            }
            Expr::ClientJoin(j) => {
                children.push(&j.projection);
                children.extend(j.outer_key.iter());
                children.extend(j.inner_key.iter());
            }
            Expr::Insert(i) => {
                children.push(&i.table);
                for a in &i.assignments {
                    children.push(&a.column);
                    children.push(&a.value);
                }
            }
            Expr::Update(u) => {
                children.push(&u.table);
                children.extend(u.filter.iter());
                for a in &u.assignments {
                    children.push(&a.column);
                    children.push(&a.value);
                }
            }
            Expr::Delete(d) => {
                children.push(&d.table);
                children.extend(d.filter.iter());
            }
            Expr::Block(b) => children.extend(b.commands.iter()),
            Expr::If(i) => {
                children.push(&i.check);
                children.push(&i.then);
                children.extend(i.otherwise.iter());
            }
            Expr::Declaration(d) => {
                children.extend(d.source.iter());
                children.extend(d.variables.iter().map(|v| &v.expr));
            }
        }
        children
    }

    pub fn for_each_child<F>(&self, mut f: F)
    where
        F: FnMut(&ExprRef),
    {
        self.children().into_iter().for_each(|c| f(c));
    }

    /// Rebuilds this node with every child replaced by `f(child)`, in the order of
    /// [`Expr::children`]. Returns `None` when `f` returned every child unchanged (by pointer), so
    /// callers can keep sharing the original node.
    pub fn map_children<F>(&self, f: &mut F) -> Option<Expr>
    where
        F: FnMut(&ExprRef) -> ExprRef,
    {
        let mut m = ChildMapper { f, changed: false };
        let new = match self {
            Expr::Table(_)
            | Expr::Column(_)
            | Expr::Literal(_)
            | Expr::Parameter(_)
            | Expr::Variable(_) => return None,
            Expr::Select(s) => {
                let from = m.one(&s.from);
                let filter = m.opt(&s.filter);
                let columns = s
                    .columns
                    .iter()
                    .map(|c| ColumnDeclaration {
                        name: c.name.clone(),
                        expr: m.one(&c.expr),
                        data_type: c.data_type,
                    })
                    .collect();
                let order_by = s
                    .order_by
                    .iter()
                    .map(|o| OrderExpr::new(o.direction, m.one(&o.expr)))
                    .collect();
                let group_by = m.many(&s.group_by);
                let skip = m.opt(&s.skip);
                let take = m.opt(&s.take);
                Expr::Select(SelectExpr {
                    alias: s.alias,
                    columns,
                    from,
                    filter,
                    order_by,
                    group_by,
                    skip,
                    take,
                    distinct: s.distinct,
                    reverse: s.reverse,
                })
            }
            Expr::Join(j) => {
                let left = m.one(&j.left);
                let right = m.one(&j.right);
                let condition = m.opt(&j.condition);
                Expr::Join(JoinExpr::new(j.join_type, left, right, condition))
            }
            Expr::Binary(b) => {
                let left = m.one(&b.left);
                let right = m.one(&b.right);
                Expr::Binary(BinaryExpr {
                    op: b.op,
                    left,
                    right,
                })
            }
            Expr::Unary(u) => Expr::Unary(UnaryExpr {
                op: u.op,
                expr: m.one(&u.expr),
            }),
            Expr::Function(func) => Expr::Function(FunctionExpr {
                name: func.name.clone(),
                args: m.many(&func.args),
                data_type: func.data_type,
            }),
            Expr::Aggregate(a) => Expr::Aggregate(AggregateExpr {
                function: a.function,
                argument: m.opt(&a.argument),
                distinct: a.distinct,
                data_type: a.data_type,
            }),
            Expr::Subquery(s) => {
                let kind = match &s.kind {
                    SubqueryKind::In { operand } => SubqueryKind::In {
                        operand: m.one(operand),
                    },
                    kind => kind.clone(),
                };
                Expr::Subquery(SubqueryExpr {
                    kind,
                    select: m.one(&s.select),
                    data_type: s.data_type,
                })
            }
            Expr::OuterJoined(o) => {
                let test = m.one(&o.test);
                let expr = m.one(&o.expr);
                Expr::OuterJoined(OuterJoinedExpr { test, expr })
            }
            Expr::Member(mem) => Expr::Member(MemberExpr {
                expr: m.one(&mem.expr),
                member: mem.member.clone(),
            }),
            Expr::Entity(e) => Expr::Entity(EntityExpr {
                entity: e.entity.clone(),
                fields: m.fields(&e.fields),
            }),
            Expr::Record(r) => Expr::Record(RecordExpr {
                fields: m.fields(&r.fields),
            }),
            Expr::ClientProjection(p) => {
                let select = m.one(&p.select);
                let projector = m.one(&p.projector);
                Expr::ClientProjection(ClientProjectionExpr {
                    select,
                    projector,
                    aggregator: p.aggregator,
                    origin: p.origin.clone(),
                })
            }
            Expr::ClientJoin(j) => {
                let projection = m.one(&j.projection);
                let outer_key = m.many(&j.outer_key);
                let inner_key = m.many(&j.inner_key);
                Expr::ClientJoin(ClientJoinExpr {
                    projection,
                    outer_key,
                    inner_key,
                })
            }
            Expr::Insert(i) => {
                let table = m.one(&i.table);
                let assignments = m.assignments(&i.assignments);
                Expr::Insert(InsertCommand { table, assignments })
            }
            Expr::Update(u) => {
                let table = m.one(&u.table);
                let filter = m.opt(&u.filter);
                let assignments = m.assignments(&u.assignments);
                Expr::Update(UpdateCommand {
                    table,
                    filter,
                    assignments,
                })
            }
            Expr::Delete(d) => {
                let table = m.one(&d.table);
                let filter = m.opt(&d.filter);
                Expr::Delete(DeleteCommand { table, filter })
            }
            Expr::Block(b) => Expr::Block(BlockCommand {
                commands: m.many(&b.commands),
            }),
            Expr::If(i) => {
                let check = m.one(&i.check);
                let then = m.one(&i.then);
                let otherwise = m.opt(&i.otherwise);
                Expr::If(IfCommand {
                    check,
                    then,
                    otherwise,
                })
            }
            Expr::Declaration(d) => {
                let source = m.opt(&d.source);
                let variables = d
                    .variables
                    .iter()
                    .map(|v| VariableDeclaration {
                        variable: v.variable.clone(),
                        data_type: v.data_type,
                        expr: m.one(&v.expr),
                    })
                    .collect();
                Expr::Declaration(DeclarationCommand { variables, source })
            }
        };

        m.changed.then_some(new)
    }

    /// Whether `pred` holds for this node or any node below it.
    pub fn any<P>(&self, pred: &mut P) -> bool
    where
        P: FnMut(&Expr) -> bool,
    {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }
}

struct ChildMapper<'f, F> {
    f: &'f mut F,
    changed: bool,
}

impl<'f, F> ChildMapper<'f, F>
where
    F: FnMut(&ExprRef) -> ExprRef,
{
    fn one(&mut self, expr: &ExprRef) -> ExprRef {
        let new = (self.f)(expr);
        if !Rc::ptr_eq(&new, expr) {
            self.changed = true;
        }
        new
    }

    fn opt(&mut self, expr: &Option<ExprRef>) -> Option<ExprRef> {
        expr.as_ref().map(|e| self.one(e))
    }

    fn many(&mut self, exprs: &[ExprRef]) -> Vec<ExprRef> {
        exprs.iter().map(|e| self.one(e)).collect()
    }

    fn fields(&mut self, fields: &[FieldBinding]) -> Vec<FieldBinding> {
        fields
            .iter()
            .map(|f| FieldBinding::new(f.member.clone(), self.one(&f.expr)))
            .collect()
    }

    fn assignments(&mut self, assignments: &[ColumnAssignment]) -> Vec<ColumnAssignment> {
        assignments
            .iter()
            .map(|a| ColumnAssignment {
                column: self.one(&a.column),
                value: self.one(&a.value),
            })
            .collect()
    }
}
