use std::collections::HashMap;

use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::select_ref;
use crate::rules::Rule;

/// Collapses columns of one select computing the same expression into the first of them.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveRedundantColumns;

impl Rule for RemoveRedundantColumns {
    fn name(&self) -> &'static str {
        "remove_redundant_columns"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(remove_redundant_columns(expr))
    }
}

pub fn remove_redundant_columns(expr: &ExprRef) -> ExprRef {
    let mut remover = RedundantColumnRemover {
        renamed: HashMap::new(),
    };
    // The root select's columns are the result shape.
    match &**expr {
        Expr::Select(_) => rewrite_children(&mut remover, expr),
        _ => remover.rewrite(expr),
    }
}

struct RedundantColumnRemover {
    /// alias -> removed column name -> kept column name
    renamed: HashMap<TableAlias, HashMap<String, String>>,
}

impl ExprRewriter for RedundantColumnRemover {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Select(_) => {
                let rewritten = rewrite_children(self, expr);
                let select = match &*rewritten {
                    Expr::Select(s) => s,
                    _ => return rewritten,
                };
                let mut kept: Vec<ColumnDeclaration> = Vec::with_capacity(select.columns.len());
                let mut renamed = HashMap::new();
                for column in &select.columns {
                    match kept.iter().find(|k| k.expr == column.expr) {
                        Some(first) => {
                            renamed.insert(column.name.clone(), first.name.clone());
                        }
                        None => kept.push(column.clone()),
                    }
                }
                if renamed.is_empty() {
                    return rewritten;
                }
                self.renamed.insert(select.alias, renamed);
                select_ref(select.clone().with_columns(kept))
            }
            Expr::Column(c) => match self.renamed.get(&c.alias).and_then(|r| r.get(&c.name)) {
                Some(name) => col(c.alias, name.clone(), c.data_type),
                None => expr.clone(),
            },
            _ => rewrite_children(self, expr),
        }
    }
}
