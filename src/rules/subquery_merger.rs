use std::collections::HashSet;

use enumset::EnumSet;

use crate::analysis::{clauses, is_column_projection, is_name_map_projection, Clause};
use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::{remove_selects_in, select_ref};
use crate::rules::Rule;

/// Folds a select into the left-most select of its `from` when the combined select computes the
/// same rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeSubqueries;

impl Rule for MergeSubqueries {
    fn name(&self) -> &'static str {
        "merge_subqueries"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(merge_subqueries(expr))
    }
}

pub fn merge_subqueries(expr: &ExprRef) -> ExprRef {
    SubqueryMerger { is_top_level: true }.rewrite(expr)
}

struct SubqueryMerger {
    /// Only the first select reached is top level; its ordering is the result ordering.
    is_top_level: bool,
}

impl ExprRewriter for SubqueryMerger {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Select(_) => {
                let is_top_level = std::mem::replace(&mut self.is_top_level, false);
                let rewritten = rewrite_children(self, expr);
                let mut select = match &*rewritten {
                    Expr::Select(s) => s.clone(),
                    _ => return rewritten,
                };
                let mut merged = false;
                while let Some(from) = left_most_select(&select.from).cloned() {
                    if !can_merge_with_from(&select, &from, is_top_level) {
                        break;
                    }
                    log::trace!("merging {} into {}", from.alias, select.alias);
                    select = merge(&select, &from);
                    merged = true;
                }
                if merged {
                    select_ref(select)
                } else {
                    rewritten
                }
            }
            _ => rewrite_children(self, expr),
        }
    }
}

/// The select reached by following the left sides of a join chain.
pub fn left_most_select(source: &Expr) -> Option<&SelectExpr> {
    match source {
        Expr::Select(s) => Some(s),
        Expr::Join(j) => left_most_select(&j.left),
        _ => None,
    }
}

/// Whether `select` may absorb `from`, the left-most select of its own `from`.
pub fn can_merge_with_from(select: &SelectExpr, from: &SelectExpr, is_top_level: bool) -> bool {
    if !is_column_projection(from) {
        return false;
    }
    let outer = clauses(select);
    let inner = clauses(from);

    if outer.contains(Clause::OrderBy) && inner.contains(Clause::OrderBy) {
        // Allowed only when the outer ordering restates the inner one.
        let substituted = remove_selects_in(select, &HashSet::from([from.alias]));
        if substituted.order_by != from.order_by {
            return false;
        }
    }
    if outer.contains(Clause::GroupBy) && inner.contains(Clause::GroupBy) {
        return false;
    }
    if outer.contains(Clause::Reverse) || inner.contains(Clause::Reverse) {
        return false;
    }
    if inner.contains(Clause::OrderBy)
        && !outer.is_disjoint(Clause::GroupBy | Clause::Aggregates | Clause::Distinct)
    {
        return false;
    }
    // The projection of the grouped select is not proven to survive any outer clause.
    if inner.contains(Clause::GroupBy) && !outer.is_empty() {
        return false;
    }
    let paging_blockers: EnumSet<Clause> = Clause::Skip
        | Clause::Distinct
        | Clause::Aggregates
        | Clause::GroupBy
        | Clause::Join
        | Clause::Where
        | Clause::OrderBy;
    if inner.contains(Clause::Take) && !outer.is_disjoint(paging_blockers | Clause::Take) {
        return false;
    }
    if inner.contains(Clause::Skip) && !outer.is_disjoint(paging_blockers) {
        return false;
    }
    if inner.contains(Clause::Distinct)
        && (!outer.is_disjoint(
            Clause::Take | Clause::Skip | Clause::GroupBy | Clause::Aggregates | Clause::Join,
        ) || !is_name_map_projection(select)
            || (outer.contains(Clause::OrderBy) && !is_top_level))
    {
        return false;
    }
    if inner.contains(Clause::Aggregates)
        && !outer.is_disjoint(
            Clause::Take
                | Clause::Skip
                | Clause::Distinct
                | Clause::Aggregates
                | Clause::GroupBy
                | Clause::Join
                | Clause::Where,
        )
    {
        return false;
    }
    true
}

fn merge(select: &SelectExpr, from: &SelectExpr) -> SelectExpr {
    let outer = remove_selects_in(select, &HashSet::from([from.alias]));
    let filter = conjunction(from.filter.iter().chain(outer.filter.iter()).cloned());
    let order_by = if outer.order_by.is_empty() {
        from.order_by.clone()
    } else {
        outer.order_by.clone()
    };
    let group_by = if outer.group_by.is_empty() {
        from.group_by.clone()
    } else {
        outer.group_by.clone()
    };
    let skip = outer.skip.clone().or_else(|| from.skip.clone());
    let take = outer.take.clone().or_else(|| from.take.clone());
    let distinct = outer.distinct || from.distinct;
    outer
        .with_filter(filter)
        .with_order_by(order_by)
        .with_group_by(group_by)
        .with_skip(skip)
        .with_take(take)
        .with_distinct(distinct)
}
