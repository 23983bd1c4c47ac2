//! SQL-like rendering of query trees for logs and test failures. This is not a dialect
//! formatter: aliases print as `t<N>` and client-side nodes get pseudo syntax.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::expr::*;

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Table(t) => write!(f, "{} AS {}", t.name, t.alias),
            Expr::Select(s) => fmt_select(f, s),
            Expr::Join(j) => {
                fmt_source(f, &j.left)?;
                write!(f, " {} ", j.join_type)?;
                fmt_source(f, &j.right)?;
                if let Some(condition) = &j.condition {
                    write!(f, " ON {}", condition)?;
                }
                Ok(())
            }
            Expr::Column(c) => write!(f, "{}.{}", c.alias, c.name),
            Expr::Literal(v) => fmt_literal(f, v),
            Expr::Parameter(p) => write!(f, ":{}", p.name),
            Expr::Binary(b) => write!(f, "({} {} {})", b.left, b.op, b.right),
            Expr::Unary(u) => match u.op {
                UnaryOp::IsNull | UnaryOp::IsNotNull => write!(f, "({} {})", u.expr, u.op),
                UnaryOp::Not => write!(f, "(NOT {})", u.expr),
                UnaryOp::Negate => write!(f, "(-{})", u.expr),
            },
            Expr::Function(func) => write!(f, "{}({})", func.name, func.args.iter().join(", ")),
            Expr::Aggregate(a) => {
                write!(f, "{}(", a.function)?;
                if a.distinct {
                    write!(f, "DISTINCT ")?;
                }
                match &a.argument {
                    Some(arg) => write!(f, "{})", arg),
                    None => write!(f, "*)"),
                }
            }
            Expr::Subquery(s) => match &s.kind {
                SubqueryKind::Scalar => write!(f, "({})", s.select),
                SubqueryKind::Exists => write!(f, "EXISTS({})", s.select),
                SubqueryKind::In { operand } => write!(f, "({} IN ({}))", operand, s.select),
            },
            Expr::OuterJoined(o) => write!(f, "OUTER_JOINED({}, {})", o.test, o.expr),
            Expr::Variable(v) => write!(f, "{}", v.variable),
            Expr::Member(m) => write!(f, "{}.{}", m.expr, m.member),
            Expr::Entity(e) => write!(f, "{} {{ {} }}", e.entity, fmt_fields(&e.fields)),
            Expr::Record(r) => write!(f, "{{ {} }}", fmt_fields(&r.fields)),
            Expr::ClientProjection(p) => write!(
                f,
                "PROJECT {:?} {} FROM ({})",
                p.aggregator, p.projector, p.select
            ),
            Expr::ClientJoin(j) => write!(
                f,
                "CLIENT JOIN ON ({}) = ({}) {}",
                j.outer_key.iter().join(", "),
                j.inner_key.iter().join(", "),
                j.projection
            ),
            Expr::Insert(i) => write!(
                f,
                "INSERT INTO {} ({}) VALUES ({})",
                i.table,
                i.assignments.iter().map(|a| &a.column).join(", "),
                i.assignments.iter().map(|a| &a.value).join(", ")
            ),
            Expr::Update(u) => {
                write!(
                    f,
                    "UPDATE {} SET {}",
                    u.table,
                    u.assignments
                        .iter()
                        .map(|a| format!("{} = {}", a.column, a.value))
                        .join(", ")
                )?;
                fmt_filter(f, &u.filter)
            }
            Expr::Delete(d) => {
                write!(f, "DELETE FROM {}", d.table)?;
                fmt_filter(f, &d.filter)
            }
            Expr::Block(b) => write!(f, "{}", b.commands.iter().join(";\n")),
            Expr::If(i) => {
                write!(f, "IF {} THEN {}", i.check, i.then)?;
                if let Some(otherwise) = &i.otherwise {
                    write!(f, " ELSE {}", otherwise)?;
                }
                write!(f, " END IF")
            }
            Expr::Declaration(d) => {
                write!(
                    f,
                    "DECLARE {}",
                    d.variables
                        .iter()
                        .map(|v| format!("{} = {}", v.variable, v.expr))
                        .join(", ")
                )?;
                if let Some(source) = &d.source {
                    write!(f, " FROM ")?;
                    fmt_source(f, source)?;
                }
                Ok(())
            }
        }
    }
}

fn fmt_select(f: &mut Formatter<'_>, s: &SelectExpr) -> fmt::Result {
    write!(f, "SELECT ")?;
    if s.distinct {
        write!(f, "DISTINCT ")?;
    }
    if s.columns.is_empty() {
        write!(f, "NULL")?;
    } else {
        write!(
            f,
            "{}",
            s.columns
                .iter()
                .map(|c| format!("{} AS {}", c.expr, c.name))
                .join(", ")
        )?;
    }
    write!(f, " FROM ")?;
    fmt_source(f, &s.from)?;
    fmt_filter(f, &s.filter)?;
    if !s.group_by.is_empty() {
        write!(f, " GROUP BY {}", s.group_by.iter().join(", "))?;
    }
    if !s.order_by.is_empty() {
        write!(
            f,
            " ORDER BY {}",
            s.order_by
                .iter()
                .map(|o| format!("{} {}", o.expr, o.direction))
                .join(", ")
        )?;
    }
    if let Some(skip) = &s.skip {
        write!(f, " SKIP {}", skip)?;
    }
    if let Some(take) = &s.take {
        write!(f, " TAKE {}", take)?;
    }
    if s.reverse {
        write!(f, " REVERSE")?;
    }
    Ok(())
}

fn fmt_source(f: &mut Formatter<'_>, source: &Expr) -> fmt::Result {
    match source {
        Expr::Select(s) => {
            write!(f, "(")?;
            fmt_select(f, s)?;
            write!(f, ") AS {}", s.alias)
        }
        other => write!(f, "{}", other),
    }
}

fn fmt_filter(f: &mut Formatter<'_>, filter: &Option<ExprRef>) -> fmt::Result {
    match filter {
        Some(filter) => write!(f, " WHERE {}", filter),
        None => Ok(()),
    }
}

fn fmt_literal(f: &mut Formatter<'_>, value: &ScalarValue) -> fmt::Result {
    match value {
        ScalarValue::Null => write!(f, "NULL"),
        ScalarValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        ScalarValue::Int(v) => write!(f, "{}", v),
        ScalarValue::Float(v) => write!(f, "{}", v),
        ScalarValue::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
    }
}

fn fmt_fields(fields: &[FieldBinding]) -> String {
    fields
        .iter()
        .map(|b| format!("{}: {}", b.member, b.expr))
        .join(", ")
}
