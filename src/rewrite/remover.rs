use std::collections::{HashMap, HashSet};

use crate::expr::*;

/// Removes every select whose alias is in `aliases` from `expr`: the select is replaced by its
/// `from`, and references to its columns are replaced by the expressions those columns compute.
///
/// Only sound for selects that do not filter, order, group or page, or whose clauses the caller
/// moves elsewhere.
pub fn remove_selects(expr: &ExprRef, aliases: &HashSet<TableAlias>) -> ExprRef {
    if aliases.is_empty() {
        return expr.clone();
    }
    let mut remover = SubqueryRemover {
        removed: aliases,
        columns: HashMap::new(),
    };
    remover.rewrite(expr)
}

/// [`remove_selects`] applied inside one select. The result is the rewritten select; `select`
/// itself is never among the removed ones.
pub fn remove_selects_in(select: &SelectExpr, aliases: &HashSet<TableAlias>) -> SelectExpr {
    match &*remove_selects(&Expr::Select(select.clone()).into_ref(), aliases) {
        Expr::Select(s) => s.clone(),
        _ => select.clone(),
    }
}

struct SubqueryRemover<'a> {
    removed: &'a HashSet<TableAlias>,
    columns: HashMap<TableAlias, HashMap<String, ExprRef>>,
}

impl<'a> ExprRewriter for SubqueryRemover<'a> {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Select(s) if self.removed.contains(&s.alias) => {
                // Declarations are reached before references in child order, so the substitution
                // is known by the time a reference to it is rewritten.
                let from = self.rewrite(&s.from);
                let columns = s
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), self.rewrite(&c.expr)))
                    .collect();
                self.columns.insert(s.alias, columns);
                from
            }
            Expr::Column(c) => self
                .columns
                .get(&c.alias)
                .and_then(|columns| columns.get(&c.name))
                .cloned()
                .unwrap_or_else(|| expr.clone()),
            _ => rewrite_children(self, expr),
        }
    }
}
