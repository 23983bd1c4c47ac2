//! Rewrite primitives shared by the rules.

use std::collections::HashSet;
use std::rc::Rc;

use crate::expr::*;

mod duplicator;
pub use duplicator::*;
mod projector;
pub use projector::*;
mod remover;
pub use remover::*;

/// Rewrites every reference to one of `old` into a reference to the same column of `new`.
pub fn map_aliases(expr: &ExprRef, old: &HashSet<TableAlias>, new: TableAlias) -> ExprRef {
    transform_up(expr, &mut |e| match &**e {
        Expr::Column(c) if old.contains(&c.alias) => {
            Some(Expr::Column(c.with_alias(new)).into_ref())
        }
        _ => None,
    })
}

pub fn map_alias(expr: &ExprRef, old: TableAlias, new: TableAlias) -> ExprRef {
    map_aliases(expr, &HashSet::from([old]), new)
}

/// [`map_alias`] over every clause of a select, keeping the select's own alias.
pub fn map_select_alias(select: &SelectExpr, old: TableAlias, new: TableAlias) -> SelectExpr {
    let mapped = map_alias(&Expr::Select(select.clone()).into_ref(), old, new);
    match &*mapped {
        Expr::Select(s) => s.clone(),
        _ => select.clone(),
    }
}

/// Wraps `select` into a pass-through select. The wrapper keeps the alias of `select`, so
/// references from above stay valid; the wrapped select gets a fresh alias.
pub fn add_redundant_select(select: &SelectExpr) -> SelectExpr {
    let inner_alias = TableAlias::new();
    let columns = select
        .columns
        .iter()
        .map(|c| {
            let reference = col(inner_alias, c.name.clone(), c.data_type);
            ColumnDeclaration::new(c.name.clone(), reference, c.data_type)
        })
        .collect();
    let inner = select.clone().with_alias(inner_alias);
    SelectExpr::new(select.alias, columns, Expr::Select(inner).into_ref())
}

/// `base` if no column uses it yet, otherwise the first of `base1`, `base2`, ... that is free.
pub fn available_column_name(columns: &[ColumnDeclaration], base: &str) -> String {
    let taken = |name: &str| columns.iter().any(|c| c.name == name);
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|name| !taken(name))
        .unwrap_or_else(|| base.to_string())
}

/// Adds a column computing `expr` under a free name derived from `base`. Returns the new select
/// and the name the column got.
pub fn add_column(select: &SelectExpr, base: &str, expr: ExprRef) -> (SelectExpr, String) {
    let name = available_column_name(&select.columns, base);
    let data_type = expr.data_type();
    let mut columns = select.columns.clone();
    columns.push(ColumnDeclaration::new(name.clone(), expr, data_type));
    (select.clone().with_columns(columns), name)
}

/// Makes a select usable as the right side of an outer join: adds a constant, non-null test
/// column and wraps `projector` so that a null test, i.e. no matching row, yields no value.
pub fn add_outer_join_test(select: &SelectExpr, projector: &ExprRef) -> (SelectExpr, ExprRef) {
    let (select, name) = add_column(select, "test", lit(1));
    let test = col(select.alias, name, DataType::Int64);
    let projector = Expr::OuterJoined(OuterJoinedExpr {
        test,
        expr: projector.clone(),
    })
    .into_ref();
    (select, projector)
}

/// `select` as a select node.
pub fn select_ref(select: SelectExpr) -> ExprRef {
    Rc::new(Expr::Select(select))
}
