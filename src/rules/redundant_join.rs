use std::collections::HashMap;

use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rules::Rule;

/// Drops a join whose right side and condition repeat an earlier join of the same chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveRedundantJoins;

impl Rule for RemoveRedundantJoins {
    fn name(&self) -> &'static str {
        "remove_redundant_joins"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(remove_redundant_joins(expr))
    }
}

pub fn remove_redundant_joins(expr: &ExprRef) -> ExprRef {
    RedundantJoinRemover {
        mapped: HashMap::new(),
    }
    .rewrite(expr)
}

struct RedundantJoinRemover {
    /// Alias of a removed right side -> alias of the equal right side that stays.
    mapped: HashMap<TableAlias, TableAlias>,
}

impl ExprRewriter for RedundantJoinRemover {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Join(_) => {
                let rewritten = rewrite_children(self, expr);
                let j = match &*rewritten {
                    Expr::Join(j) => j,
                    _ => return rewritten,
                };
                let later = match &*j.right {
                    Expr::Table(_) | Expr::Select(_) => j.right.declared_alias(),
                    _ => None,
                };
                let earlier = later.and_then(|_| find_similar_right(&j.left, j));
                match (later, earlier) {
                    (Some(later), Some(earlier)) => {
                        log::trace!("join of {} repeats {}", later, earlier);
                        self.mapped.insert(later, earlier);
                        j.left.clone()
                    }
                    _ => rewritten,
                }
            }
            Expr::Column(c) => match self.mapped.get(&c.alias) {
                Some(alias) => Expr::Column(c.with_alias(*alias)).into_ref(),
                None => expr.clone(),
            },
            _ => rewrite_children(self, expr),
        }
    }
}

/// Alias of a right side in the join tree `source` that `join` repeats.
fn find_similar_right(source: &Expr, join: &JoinExpr) -> Option<TableAlias> {
    let candidate = source.as_join()?;
    if candidate.join_type == join.join_type
        && ExprComparer::new().equal(&candidate.right, &join.right)
    {
        if let (Some(earlier), Some(later)) =
            (candidate.right.declared_alias(), join.right.declared_alias())
        {
            let conditions_equal = match (&candidate.condition, &join.condition) {
                (None, None) => true,
                (Some(a), Some(b)) => ExprComparer::with_aliases([(earlier, later)]).equal(a, b),
                _ => false,
            };
            if conditions_equal {
                return Some(earlier);
            }
        }
    }
    find_similar_right(&candidate.left, join).or_else(|| find_similar_right(&candidate.right, join))
}
