use std::collections::HashMap;

use crate::expr::*;
use crate::scope::all_declared_aliases;

/// Deep copy of `expr` in which every alias and variable declared inside `expr` is replaced by a
/// fresh one, and every reference to them follows. References to aliases declared outside `expr`
/// are kept, so the copy stays correlated to the same enclosing sources as the original.
pub fn duplicate(expr: &ExprRef) -> ExprRef {
    let aliases: HashMap<TableAlias, TableAlias> = all_declared_aliases(expr)
        .into_iter()
        .map(|a| (a, TableAlias::new()))
        .collect();
    let mut variables: HashMap<Variable, Variable> = HashMap::new();
    expr.any(&mut |e| {
        if let Expr::Declaration(d) = e {
            for v in &d.variables {
                variables.insert(v.variable.clone(), v.variable.fresh());
            }
        }
        false
    });

    transform_up(expr, &mut |e| match &**e {
        Expr::Table(t) => aliases.get(&t.alias).map(|&alias| {
            Expr::Table(TableExpr {
                alias,
                ..t.clone()
            })
            .into_ref()
        }),
        Expr::Select(s) => aliases
            .get(&s.alias)
            .map(|&alias| Expr::Select(s.clone().with_alias(alias)).into_ref()),
        Expr::Column(c) => aliases
            .get(&c.alias)
            .map(|&alias| Expr::Column(c.with_alias(alias)).into_ref()),
        Expr::Variable(v) => variables.get(&v.variable).map(|fresh| {
            Expr::Variable(VariableExpr {
                variable: fresh.clone(),
                data_type: v.data_type,
            })
            .into_ref()
        }),
        Expr::Declaration(d) => {
            let mut declaration = d.clone();
            for v in &mut declaration.variables {
                if let Some(fresh) = variables.get(&v.variable) {
                    v.variable = fresh.clone();
                }
            }
            Some(Expr::Declaration(declaration).into_ref())
        }
        _ => None,
    })
}

/// [`duplicate`] of a select.
pub fn duplicate_select(select: &SelectExpr) -> SelectExpr {
    match &*duplicate(&Expr::Select(select.clone()).into_ref()) {
        Expr::Select(s) => s.clone(),
        _ => select.clone(),
    }
}
