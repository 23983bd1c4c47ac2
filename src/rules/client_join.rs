use std::collections::HashSet;

use crate::analysis::split_conjuncts;
use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::{
    add_column, add_outer_join_test, duplicate_select, map_alias, map_select_alias,
    project_columns, select_ref,
};
use crate::rules::Rule;
use crate::scope::referenced_aliases;

/// Replaces nested projections, which would run once per outer row, by one query over the outer
/// rows joined with the nested rows, matched to the outer rows in memory by key.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvertClientJoins;

impl Rule for ConvertClientJoins {
    fn name(&self) -> &'static str {
        "convert_client_joins"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(convert_client_joins(expr))
    }
}

pub fn convert_client_joins(expr: &ExprRef) -> ExprRef {
    ClientJoinRewriter {
        is_top_level: true,
        under_client_join: false,
        current: None,
    }
    .rewrite(expr)
}

struct ClientJoinRewriter {
    is_top_level: bool,
    /// Set while entering the projection of an existing client join, which is already converted.
    under_client_join: bool,
    current: Option<SelectExpr>,
}

impl ClientJoinRewriter {
    fn rewrite_projection(&mut self, expr: &ExprRef, projection: &ClientProjectionExpr) -> ExprRef {
        let select = match projection.select() {
            Some(select) => select.clone(),
            None => return expr.clone(),
        };
        let outer = self.current.replace(select);
        let converted = std::mem::take(&mut self.under_client_join);
        let result = if std::mem::replace(&mut self.is_top_level, false) || converted {
            rewrite_children(self, expr)
        } else {
            match outer.as_ref().and_then(|outer| self.client_join(outer, projection)) {
                Some(result) => result,
                None => rewrite_children(self, expr),
            }
        };
        self.current = outer;
        result
    }

    fn client_join(
        &mut self,
        outer: &SelectExpr,
        projection: &ClientProjectionExpr,
    ) -> Option<ExprRef> {
        let nested = projection.select()?;
        let outer_copy = duplicate_select(outer);
        let inner = map_select_alias(nested, outer.alias, outer_copy.alias);
        let keys = equi_join_keys(inner.filter.as_ref()?, outer_copy.alias)?;
        log::trace!("client join of {} on {} keys", inner.alias, keys.len());

        let (inner, projector) = add_outer_join_test(&inner, &projection.projector);
        let joined_alias = TableAlias::new();
        let projected = project_columns(
            &projector,
            &[],
            joined_alias,
            &HashSet::from([outer_copy.alias, inner.alias]),
        );
        let from = join(
            JoinType::OuterApply,
            select_ref(outer_copy.clone()),
            select_ref(inner),
            None,
        );
        let mut joined = SelectExpr::new(joined_alias, projected.columns, from)
            .with_distinct(projection.is_singleton());

        let mut outer_key = Vec::with_capacity(keys.len());
        let mut inner_key = Vec::with_capacity(keys.len());
        for key in keys {
            let base = key.as_column().map(|c| c.name.clone()).unwrap_or_else(|| "key".to_string());
            let (with_key, name) = add_column(&joined, &base, key.clone());
            joined = with_key;
            inner_key.push(col(joined_alias, name, key.data_type()));
            outer_key.push(map_alias(&key, outer_copy.alias, outer.alias));
        }

        // Deeper projections now hang below the joined select.
        let saved = self.current.replace(joined.clone());
        let projector = self.rewrite(&projected.projector);
        self.current = saved;

        let projection = Expr::ClientProjection(
            ClientProjectionExpr::new(joined, projector, projection.aggregator)
                .with_origin(projection.origin.clone()),
        )
        .into_ref();
        Some(
            Expr::ClientJoin(ClientJoinExpr {
                projection,
                outer_key,
                inner_key,
            })
            .into_ref(),
        )
    }
}

/// The outer side of every conjunct of `predicate` that references `outer_alias`, provided all
/// of them compare a column of `outer_alias` with another column.
fn equi_join_keys(predicate: &ExprRef, outer_alias: TableAlias) -> Option<Vec<ExprRef>> {
    let mut keys = Vec::new();
    for conjunct in split_conjuncts(predicate) {
        if !referenced_aliases(&conjunct).contains(&outer_alias) {
            continue;
        }
        let b = conjunct.as_binary().filter(|b| b.op == BinaryOp::Eq)?;
        match (b.left.as_column(), b.right.as_column()) {
            (Some(l), Some(r)) if l.alias == outer_alias && r.alias != outer_alias => {
                keys.push(b.left.clone())
            }
            (Some(l), Some(r)) if r.alias == outer_alias && l.alias != outer_alias => {
                keys.push(b.right.clone())
            }
            _ => return None,
        }
    }
    (!keys.is_empty()).then_some(keys)
}

impl ExprRewriter for ClientJoinRewriter {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::ClientProjection(p) => self.rewrite_projection(expr, p),
            Expr::ClientJoin(_) => {
                self.under_client_join = true;
                let rewritten = rewrite_children(self, expr);
                self.under_client_join = false;
                rewritten
            }
            Expr::Subquery(_) => expr.clone(),
            _ => rewrite_children(self, expr),
        }
    }
}
