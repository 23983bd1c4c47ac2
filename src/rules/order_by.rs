use std::collections::HashSet;

use crate::analysis::has_aggregates;
use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::{available_column_name, select_ref};
use crate::rules::Rule;
use crate::scope::declared_aliases;

/// Moves `order by` out of selects where it means nothing to the outermost select, or to the
/// nearest paged select, where it decides the result.
#[derive(Clone, Copy, Debug, Default)]
pub struct HoistOrderBy;

impl Rule for HoistOrderBy {
    fn name(&self) -> &'static str {
        "hoist_order_by"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(hoist_order_by(expr))
    }
}

/// `expr` is treated as the outermost select of the query, whatever is above it.
pub fn hoist_order_by(expr: &ExprRef) -> ExprRef {
    OrderByRewriter {
        gathered: None,
        is_outermost: true,
    }
    .rewrite(expr)
}

struct OrderByRewriter {
    /// Orderings collected below the current position, most significant first.
    gathered: Option<Vec<OrderExpr>>,
    is_outermost: bool,
}

impl OrderByRewriter {
    /// Puts `orderings` in front of the gathered ones and drops later repeats of the same column.
    fn prepend(&mut self, orderings: Option<Vec<OrderExpr>>) {
        let mut orderings = match orderings {
            Some(orderings) => orderings,
            None => return,
        };
        orderings.extend(self.gathered.take().unwrap_or_default());
        let mut seen = HashSet::new();
        orderings.retain(|o| match o.expr.as_column() {
            Some(c) => seen.insert((c.alias, c.name.clone())),
            None => true,
        });
        self.gathered = Some(orderings);
    }

    fn reverse(&mut self) {
        if let Some(gathered) = &mut self.gathered {
            for ordering in gathered.iter_mut() {
                *ordering = ordering.reversed();
            }
        }
    }

    fn rewrite_select(&mut self, expr: &ExprRef) -> ExprRef {
        let was_outermost = std::mem::replace(&mut self.is_outermost, false);
        let rewritten = rewrite_children(self, expr);
        self.is_outermost = was_outermost;
        let select = match &*rewritten {
            Expr::Select(s) => s,
            _ => return rewritten,
        };

        let grouped = !select.group_by.is_empty();
        let aggregates = has_aggregates(select);
        let can_have_order_by = was_outermost || select.is_paged();
        let can_receive_orderings =
            can_have_order_by && !grouped && !select.distinct && !aggregates;

        if !select.order_by.is_empty() {
            self.prepend(Some(select.order_by.clone()));
        }
        if select.reverse {
            self.reverse();
        }
        let order_by = if can_receive_orderings {
            self.gathered.clone().unwrap_or_default()
        } else if can_have_order_by {
            select.order_by.clone()
        } else {
            vec![]
        };

        let can_pass_on = !was_outermost && !grouped && !select.distinct && !aggregates;
        let mut columns = select.columns.clone();
        if let Some(gathered) = self.gathered.take() {
            if can_pass_on {
                let sources: HashSet<TableAlias> =
                    declared_aliases(&select.from).into_iter().collect();
                let (rebound_columns, rebound) =
                    rebind(&gathered, select.alias, &sources, &columns);
                columns = rebound_columns;
                self.prepend(Some(rebound));
            }
        }

        if order_by != select.order_by || columns != select.columns || select.reverse {
            select_ref(
                select
                    .clone()
                    .with_columns(columns)
                    .with_order_by(order_by)
                    .with_reverse(false),
            )
        } else {
            rewritten
        }
    }
}

/// Re-expresses `orderings` in terms of the columns of the select declared as `alias`, adding a
/// column for every ordering expression it does not project yet. Column orderings on aliases
/// other than `sources` cannot be observed above and are dropped.
fn rebind(
    orderings: &[OrderExpr],
    alias: TableAlias,
    sources: &HashSet<TableAlias>,
    columns: &[ColumnDeclaration],
) -> (Vec<ColumnDeclaration>, Vec<OrderExpr>) {
    let mut columns = columns.to_vec();
    let mut rebound = Vec::with_capacity(orderings.len());
    for ordering in orderings {
        let column = ordering.expr.as_column();
        if let Some(c) = column {
            if !sources.contains(&c.alias) {
                continue;
            }
        }
        let existing = columns.iter().find(|decl| {
            let same_column = matches!(
                (column, decl.expr.as_column()),
                (Some(c), Some(d)) if c.alias == d.alias && c.name == d.name
            );
            decl.expr == ordering.expr || same_column
        });
        let data_type = ordering.expr.data_type();
        let name = match existing {
            Some(decl) => decl.name.clone(),
            None => {
                let base = column
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| format!("c{}", columns.len()));
                let name = available_column_name(&columns, &base);
                let declaration =
                    ColumnDeclaration::new(name.clone(), ordering.expr.clone(), data_type);
                columns.push(declaration);
                name
            }
        };
        rebound.push(OrderExpr::new(ordering.direction, col(alias, name, data_type)));
    }
    (columns, rebound)
}

impl ExprRewriter for OrderByRewriter {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Select(_) => self.rewrite_select(expr),
            Expr::Join(j) => {
                let left = self.rewrite(&j.left);
                let left_orderings = self.gathered.take();
                let right = self.rewrite(&j.right);
                self.prepend(left_orderings);
                let condition = j.condition.as_ref().map(|c| self.rewrite(c));
                let unchanged = std::rc::Rc::ptr_eq(&left, &j.left)
                    && std::rc::Rc::ptr_eq(&right, &j.right)
                    && match (&condition, &j.condition) {
                        (Some(a), Some(b)) => std::rc::Rc::ptr_eq(a, b),
                        _ => true,
                    };
                if unchanged {
                    expr.clone()
                } else {
                    join(j.join_type, left, right, condition)
                }
            }
            Expr::Subquery(_) => {
                let saved = self.gathered.take();
                let rewritten = rewrite_children(self, expr);
                self.gathered = saved;
                rewritten
            }
            Expr::ClientProjection(_) => {
                let saved = self.gathered.take();
                let was_outermost = std::mem::replace(&mut self.is_outermost, true);
                let rewritten = rewrite_children(self, expr);
                self.is_outermost = was_outermost;
                self.gathered = saved;
                rewritten
            }
            _ => rewrite_children(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::has_valid_references;

    fn x(alias: TableAlias) -> ExprRef {
        col(alias, "x", DataType::Int64)
    }

    #[test]
    fn test_ordering_moves_to_outermost_select() {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let inner = SelectBuilder::new(t)
            .column("x", x(ta))
            .order_by(OrderDirection::Descending, x(ta))
            .build();
        let ia = inner.alias;
        let outer = SelectBuilder::new(select_ref(inner)).column("x", x(ia)).build();
        let oa = outer.alias;
        let query = projection(outer, x(oa), Aggregator::List);

        let result = hoist_order_by(&query);
        let outer = result.as_client_projection().unwrap().select().unwrap().clone();
        assert_eq!(outer.order_by, vec![OrderExpr::new(OrderDirection::Descending, x(ia))]);
        assert!(outer.from.as_select().unwrap().order_by.is_empty());
        assert!(has_valid_references(&result, None));
    }

    #[test]
    fn test_paged_select_keeps_and_passes_ordering() {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let inner = SelectBuilder::new(t)
            .column("y", col(ta, "y", DataType::Int64))
            .order_by(OrderDirection::Ascending, x(ta))
            .take(lit(3))
            .build();
        let ia = inner.alias;
        let outer = SelectBuilder::new(select_ref(inner))
            .column("y", col(ia, "y", DataType::Int64))
            .build_ref();

        let result = hoist_order_by(&outer);
        let outer = result.as_select().unwrap();
        let inner = outer.from.as_select().unwrap();
        assert_eq!(inner.order_by, vec![OrderExpr::new(OrderDirection::Ascending, x(ta))]);
        // The ordering column is projected so the outer select can order by it.
        assert_eq!(inner.column_names().collect::<Vec<_>>(), vec!["y", "x"]);
        assert_eq!(outer.order_by, vec![OrderExpr::new(OrderDirection::Ascending, x(ia))]);
        assert!(has_valid_references(&result, None));
    }

    #[test]
    fn test_reverse_flips_gathered_orderings() {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let select = SelectBuilder::new(t)
            .column("x", x(ta))
            .order_by(OrderDirection::Ascending, x(ta))
            .reverse()
            .build_ref();
        let result = hoist_order_by(&select);
        let select = result.as_select().unwrap();
        assert!(!select.reverse);
        assert_eq!(select.order_by, vec![OrderExpr::new(OrderDirection::Descending, x(ta))]);
    }

    #[test]
    fn test_grouped_select_drops_inner_ordering() {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let inner = SelectBuilder::new(t)
            .column("x", x(ta))
            .order_by(OrderDirection::Ascending, x(ta))
            .build();
        let ia = inner.alias;
        let grouped = SelectBuilder::new(select_ref(inner))
            .column("x", x(ia))
            .column("n", count_star())
            .group_by(x(ia))
            .build_ref();
        let result = hoist_order_by(&grouped);
        let grouped = result.as_select().unwrap();
        assert!(grouped.order_by.is_empty());
        assert!(grouped.from.as_select().unwrap().order_by.is_empty());
    }
}
