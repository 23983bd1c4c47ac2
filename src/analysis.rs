//! Cheap structural predicates shared by several rules as preconditions.

use enumset::{EnumSet, EnumSetType};
use smallvec::{smallvec, SmallVec};

use crate::expr::*;
use crate::scope::declared_aliases;

/// Clauses present on a select, as seen by merge preconditions.
#[derive(EnumSetType, Debug)]
pub enum Clause {
    Where,
    OrderBy,
    GroupBy,
    Skip,
    Take,
    Distinct,
    Reverse,
    Aggregates,
    Join,
}

pub fn clauses(select: &SelectExpr) -> EnumSet<Clause> {
    let mut clauses = EnumSet::new();
    if select.filter.is_some() {
        clauses |= Clause::Where;
    }
    if !select.order_by.is_empty() {
        clauses |= Clause::OrderBy;
    }
    if !select.group_by.is_empty() {
        clauses |= Clause::GroupBy;
    }
    if select.skip.is_some() {
        clauses |= Clause::Skip;
    }
    if select.take.is_some() {
        clauses |= Clause::Take;
    }
    if select.distinct {
        clauses |= Clause::Distinct;
    }
    if select.reverse {
        clauses |= Clause::Reverse;
    }
    if has_aggregates(select) {
        clauses |= Clause::Aggregates;
    }
    if matches!(&*select.from, Expr::Join(_)) {
        clauses |= Clause::Join;
    }
    clauses
}

/// Whether the select's own columns, `where` or `order by` aggregate. Nested selects and
/// subqueries are optimized on their own and are not looked into.
pub fn has_aggregates(select: &SelectExpr) -> bool {
    select.columns.iter().any(|c| contains_aggregate(&c.expr))
        || select.filter.iter().any(|f| contains_aggregate(f))
        || select.order_by.iter().any(|o| contains_aggregate(&o.expr))
}

pub fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Aggregate(_) => true,
        Expr::Subquery(s) => match &s.kind {
            SubqueryKind::In { operand } => contains_aggregate(operand),
            _ => false,
        },
        Expr::Select(_) | Expr::ClientProjection(_) => false,
        _ => expr.children().into_iter().any(|c| contains_aggregate(c)),
    }
}

/// Every column re-exposes a same-named column of a source declared by the immediate `from`.
pub fn is_simple_projection(select: &SelectExpr) -> bool {
    let sources = declared_aliases(&select.from);
    select.columns.iter().all(|decl| match &*decl.expr {
        Expr::Column(c) => c.name == decl.name && sources.contains(&c.alias),
        _ => false,
    })
}

/// `from` is a select with as many columns, and column `i` re-exposes column `i` of `from` by
/// name.
pub fn is_name_map_projection(select: &SelectExpr) -> bool {
    let from = match &*select.from {
        Expr::Select(from) => from,
        _ => return false,
    };
    select.columns.len() == from.columns.len()
        && select
            .columns
            .iter()
            .zip(&from.columns)
            .all(|(decl, inner)| match &*decl.expr {
                Expr::Column(c) => c.alias == from.alias && c.name == inner.name,
                _ => false,
            })
}

/// A select that changes nothing about the rows of its `from` and can be replaced by it.
pub fn is_redundant_subquery(select: &SelectExpr) -> bool {
    (is_simple_projection(select) || is_name_map_projection(select))
        && !select.distinct
        && !select.reverse
        && select.skip.is_none()
        && select.take.is_none()
        && select.filter.is_none()
        && select.order_by.is_empty()
        && select.group_by.is_empty()
}

/// Every column is a plain column reference or a literal.
pub fn is_column_projection(select: &SelectExpr) -> bool {
    select
        .columns
        .iter()
        .all(|c| matches!(&*c.expr, Expr::Column(_) | Expr::Literal(_)))
}

/// A singleton join may be added below this select without changing its rows.
pub fn can_join_on_server(select: &SelectExpr) -> bool {
    !select.distinct && select.group_by.is_empty() && !has_aggregates(select)
}

/// Splits a predicate into its top-level `AND` operands.
pub fn split_conjuncts(predicate: &ExprRef) -> SmallVec<[ExprRef; 4]> {
    match &**predicate {
        Expr::Binary(b) if b.op == BinaryOp::And => {
            let mut conjuncts = split_conjuncts(&b.left);
            conjuncts.extend(split_conjuncts(&b.right));
            conjuncts
        }
        _ => smallvec![predicate.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> (SelectExpr, TableAlias) {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let inner = SelectBuilder::new(t)
            .column("a", col(ta, "a", DataType::Int64))
            .column("b", col(ta, "b", DataType::Int64))
            .build();
        (inner, ta)
    }

    #[test]
    fn test_redundant_subquery() {
        let (inner, ta) = base();
        assert!(is_simple_projection(&inner));
        assert!(is_redundant_subquery(&inner));

        let filtered = inner.clone().with_filter(Some(eq(col(ta, "a", DataType::Int64), lit(1))));
        assert!(!is_redundant_subquery(&filtered));

        let renamed = SelectBuilder::new(table("U")).column("x", lit(1)).build();
        assert!(!is_simple_projection(&renamed));
        assert!(is_column_projection(&renamed));
    }

    #[test]
    fn test_name_map_projection() {
        let (inner, _) = base();
        let ia = inner.alias;
        let outer = SelectBuilder::new(Expr::Select(inner).into_ref())
            .column("x", col(ia, "a", DataType::Int64))
            .column("y", col(ia, "b", DataType::Int64))
            .build();
        assert!(is_name_map_projection(&outer));
        assert!(!is_simple_projection(&outer));

        let swapped = outer.clone().with_columns(vec![
            ColumnDeclaration::new("x", col(ia, "b", DataType::Int64), DataType::Int64),
            ColumnDeclaration::new("y", col(ia, "a", DataType::Int64), DataType::Int64),
        ]);
        assert!(!is_name_map_projection(&swapped));
    }

    #[test]
    fn test_aggregates_not_seen_through_subqueries() {
        let (inner, ta) = base();
        let counted = SelectBuilder::new(table("U")).column("n", count_star()).build();
        assert!(has_aggregates(&counted));

        let with_subquery = inner
            .clone()
            .with_filter(Some(binary(
                BinaryOp::Gt,
                col(ta, "a", DataType::Int64),
                scalar_subquery(counted),
            )));
        assert!(!has_aggregates(&with_subquery));
        assert!(clauses(&with_subquery).contains(Clause::Where));
        assert!(!clauses(&with_subquery).contains(Clause::Aggregates));
    }

    #[test]
    fn test_split_conjuncts() {
        let (a, b, c) = (lit(1), lit(2), lit(3));
        let predicate = and(and(a.clone(), b.clone()), c.clone());
        let parts = split_conjuncts(&predicate);
        assert_eq!(parts.len(), 3);
        assert!(std::rc::Rc::ptr_eq(&parts[0], &a));
        assert_eq!(split_conjuncts(&or(a, b)).len(), 1);
    }
}
