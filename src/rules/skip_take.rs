use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::{add_redundant_select, select_ref};
use crate::rules::{hoist_order_by, Rule};

/// For dialects without an offset clause: rewrites `order by x skip s take t` into the last `t`
/// rows of the first `s + t`, by taking `s + t` rows, reversing the ordering to take `t`, and
/// restoring the ordering in a third select.
///
/// The result is only exact while the source has at least `s + t` rows and `x` has no ties. A
/// select that skips without an ordered take has no `s + t` bound and is left as it is.
#[derive(Clone, Copy, Debug, Default)]
pub struct RewriteSkipTake;

impl Rule for RewriteSkipTake {
    fn name(&self) -> &'static str {
        "rewrite_skip_take"
    }

    fn apply(&self, expr: &ExprRef, context: &OptimizerContext) -> OptResult<ExprRef> {
        if context.config().supports_skip {
            return Ok(expr.clone());
        }
        Ok(rewrite_skip_take(expr))
    }
}

pub fn rewrite_skip_take(expr: &ExprRef) -> ExprRef {
    transform_up(expr, &mut |e| match &**e {
        Expr::Select(s) => nest_paged_select(s).map(select_ref),
        _ => None,
    })
}

fn hoist_in(select: SelectExpr) -> Option<SelectExpr> {
    hoist_order_by(&select_ref(select)).as_select().cloned()
}

fn reversed(order_by: &[OrderExpr]) -> Vec<OrderExpr> {
    order_by.iter().map(OrderExpr::reversed).collect()
}

fn nest_paged_select(select: &SelectExpr) -> Option<SelectExpr> {
    let skip = select.skip.clone()?;
    let take = match &select.take {
        Some(take) if !select.order_by.is_empty() && !select.reverse => take.clone(),
        _ => {
            log::debug!("select {} skips without an ordered take, left as is", select.alias);
            return None;
        }
    };
    log::trace!("nesting paged select {}", select.alias);

    let first = select
        .clone()
        .with_skip(None)
        .with_take(Some(add(skip, take.clone())));
    let last = add_redundant_select(&first).with_take(Some(take));
    let last = hoist_in(last)?;
    let inverted = reversed(&last.order_by);
    let last = last.with_order_by(inverted);

    // The placeholder take keeps the top select paged while its ordering is hoisted.
    let top = add_redundant_select(&last).with_take(Some(lit(0)));
    let top = hoist_in(top)?;
    let restored = reversed(&top.order_by);
    Some(top.with_order_by(restored).with_take(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::OptimizerConfig;
    use crate::rules::empty_context;
    use crate::scope::has_valid_references;

    fn paged() -> (ExprRef, TableAlias) {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let select = SelectBuilder::new(t)
            .column("x", col(ta, "x", DataType::Int64))
            .order_by(OrderDirection::Ascending, col(ta, "x", DataType::Int64))
            .skip(lit(5))
            .take(lit(10))
            .build_ref();
        (select, ta)
    }

    #[test]
    fn test_nested_top_selects() {
        let (select, ta) = paged();
        let alias = select.declared_alias().unwrap();
        let result = rewrite_skip_take(&select);

        let top = result.as_select().unwrap();
        assert_eq!(top.alias, alias);
        assert!(top.skip.is_none() && top.take.is_none());
        assert_eq!(top.order_by[0].direction, OrderDirection::Ascending);

        let last = top.from.as_select().unwrap();
        assert_eq!(last.take, Some(lit(10)));
        assert_eq!(last.order_by[0].direction, OrderDirection::Descending);

        let first = last.from.as_select().unwrap();
        assert!(first.skip.is_none());
        assert_eq!(first.take, Some(lit(15)));
        assert_eq!(
            first.order_by,
            vec![OrderExpr::new(OrderDirection::Ascending, col(ta, "x", DataType::Int64))]
        );
        assert!(has_valid_references(&result, None));
    }

    #[test]
    fn test_native_offset_leaves_tree() {
        let (select, _) = paged();
        let context = empty_context();
        let result = RewriteSkipTake.apply(&select, &context).unwrap();
        assert!(std::rc::Rc::ptr_eq(&result, &select));

        let context =
            empty_context().with_config(OptimizerConfig::default().with_supports_skip(false));
        let result = RewriteSkipTake.apply(&select, &context).unwrap();
        assert!(result.as_select().unwrap().skip.is_none());
    }

    #[test]
    fn test_skip_without_take_is_left_alone() {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let select = SelectBuilder::new(t)
            .column("x", col(ta, "x", DataType::Int64))
            .order_by(OrderDirection::Ascending, col(ta, "x", DataType::Int64))
            .skip(lit(5))
            .build_ref();
        assert!(std::rc::Rc::ptr_eq(&rewrite_skip_take(&select), &select));

        let context =
            empty_context().with_config(OptimizerConfig::default().with_supports_skip(false));
        let result = RewriteSkipTake.apply(&select, &context).unwrap();
        assert_eq!(result.as_select().unwrap().skip, Some(lit(5)));
    }
}
