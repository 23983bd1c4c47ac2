use std::collections::HashSet;

use crate::analysis::split_conjuncts;
use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::select_ref;
use crate::rules::Rule;
use crate::scope::{declared_aliases, external_aliases};

/// Turns `from A, B where p(A, B)` into `from A join B on p(A, B)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PromoteCrossJoins;

impl Rule for PromoteCrossJoins {
    fn name(&self) -> &'static str {
        "promote_cross_joins"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(promote_cross_joins(expr))
    }
}

pub fn promote_cross_joins(expr: &ExprRef) -> ExprRef {
    transform_up(expr, &mut |e| match &**e {
        Expr::Select(s) => promote_in_select(s).map(select_ref),
        _ => None,
    })
}

fn promote_in_select(select: &SelectExpr) -> Option<SelectExpr> {
    let filter = select.filter.as_ref()?;
    let mut conjuncts = split_conjuncts(filter).into_vec();
    let from = promote(&select.from, &mut conjuncts)?;
    Some(
        select
            .clone()
            .with_from(from)
            .with_filter(conjunction(conjuncts)),
    )
}

/// Moves usable conjuncts into the cross joins of `source`. Returns `None` if nothing moved.
///
/// Only positions where a `where` conjunct commutes with the join are entered: the left side of
/// every join, and the right side of cross and inner joins.
fn promote(source: &ExprRef, conjuncts: &mut Vec<ExprRef>) -> Option<ExprRef> {
    let j = source.as_join()?;
    let left = promote(&j.left, conjuncts);
    let right = match j.join_type {
        JoinType::Cross | JoinType::Inner => promote(&j.right, conjuncts),
        _ => None,
    };
    let changed = left.is_some() || right.is_some();
    let left = left.unwrap_or_else(|| j.left.clone());
    let right = right.unwrap_or_else(|| j.right.clone());

    if j.join_type == JoinType::Cross {
        let left_aliases: HashSet<TableAlias> = declared_aliases(&left).into_iter().collect();
        let right_aliases: HashSet<TableAlias> = declared_aliases(&right).into_iter().collect();
        let (usable, rest): (Vec<ExprRef>, Vec<ExprRef>) =
            conjuncts.drain(..).partition(|conjunct| {
                let referenced = external_aliases(conjunct);
                !referenced.is_empty()
                    && referenced
                        .iter()
                        .all(|a| left_aliases.contains(a) || right_aliases.contains(a))
                    && referenced.iter().any(|a| left_aliases.contains(a))
                    && referenced.iter().any(|a| right_aliases.contains(a))
            });
        *conjuncts = rest;
        if let Some(condition) = conjunction(usable) {
            log::trace!("promoting cross join on {}", condition);
            return Some(join(JoinType::Inner, left, right, Some(condition)));
        }
    }
    changed.then(|| join(j.join_type, left, right, j.condition.clone()))
}
