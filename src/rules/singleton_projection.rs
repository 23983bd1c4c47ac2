use std::collections::HashSet;

use crate::analysis::can_join_on_server;
use crate::error::OptResult;
use crate::expr::*;
use crate::mapping::QueryPolicy;
use crate::optimizer::OptimizerContext;
use crate::rewrite::{
    add_outer_join_test, add_redundant_select, duplicate, map_select_alias, project_columns,
    select_ref,
};
use crate::rules::Rule;

/// Turns nested singleton projections into outer apply joins of the enclosing select, so that
/// one server query returns both.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvertSingletonProjections;

impl Rule for ConvertSingletonProjections {
    fn name(&self) -> &'static str {
        "convert_singleton_projections"
    }

    fn apply(&self, expr: &ExprRef, context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(convert_singleton_projections(expr, context.policy()))
    }
}

pub fn convert_singleton_projections(expr: &ExprRef, policy: &dyn QueryPolicy) -> ExprRef {
    SingletonProjectionRewriter {
        policy,
        is_top_level: true,
        current: None,
    }
    .rewrite(expr)
}

struct SingletonProjectionRewriter<'a> {
    policy: &'a dyn QueryPolicy,
    is_top_level: bool,
    /// Select of the projection whose projector is being rewritten.
    current: Option<SelectExpr>,
}

impl<'a> SingletonProjectionRewriter<'a> {
    fn is_deferred(&self, projection: &ClientProjectionExpr) -> bool {
        projection
            .origin
            .as_ref()
            .map_or(false, |o| self.policy.is_deferred_loaded(&o.entity, &o.member))
    }

    fn rewrite_projection(&mut self, expr: &ExprRef, projection: &ClientProjectionExpr) -> ExprRef {
        let select = match projection.select() {
            Some(select) => select,
            None => return expr.clone(),
        };

        if self.is_top_level {
            self.is_top_level = false;
            self.current = Some(select.clone());
            let projector = self.rewrite(&projection.projector);
            let current = self.current.take().unwrap_or_else(|| select.clone());
            if std::rc::Rc::ptr_eq(&projector, &projection.projector) && current == *select {
                return expr.clone();
            }
            return Expr::ClientProjection(
                ClientProjectionExpr::new(current, projector, projection.aggregator)
                    .with_origin(projection.origin.clone()),
            )
            .into_ref();
        }

        let joinable = match &self.current {
            Some(current) => {
                projection.is_singleton()
                    && can_join_on_server(current)
                    && can_join_on_server(select)
                    && !self.is_deferred(projection)
            }
            None => false,
        };
        if joinable {
            return self.flatten(expr);
        }

        // The nested projection becomes the target of its own nested singletons.
        let saved_top = std::mem::replace(&mut self.is_top_level, true);
        let saved = self.current.take();
        let result = self.rewrite_projection(expr, projection);
        self.is_top_level = saved_top;
        self.current = saved;
        result
    }

    fn flatten(&mut self, expr: &ExprRef) -> ExprRef {
        let duplicated = duplicate(expr);
        let (projection, nested, current) = match (
            duplicated.as_client_projection(),
            duplicated.as_client_projection().and_then(ClientProjectionExpr::select),
            self.current.take(),
        ) {
            (Some(p), Some(s), Some(c)) => (p, s, c),
            (_, _, current) => {
                self.current = current;
                return expr.clone();
            }
        };
        log::trace!("joining singleton projection {} into {}", nested.alias, current.alias);

        let outer = add_redundant_select(&current);
        let inner_alias = match outer.from.declared_alias() {
            Some(alias) => alias,
            None => {
                self.current = Some(current);
                return expr.clone();
            }
        };
        let nested = map_select_alias(nested, outer.alias, inner_alias);
        let (nested, projector) = add_outer_join_test(&nested, &projection.projector);
        let projected = project_columns(
            &projector,
            &outer.columns,
            outer.alias,
            &HashSet::from([inner_alias, nested.alias]),
        );
        let from = join(JoinType::OuterApply, outer.from.clone(), select_ref(nested), None);
        self.current = Some(SelectExpr::new(outer.alias, projected.columns, from));
        self.rewrite(&projected.projector)
    }
}

impl<'a> ExprRewriter for SingletonProjectionRewriter<'a> {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::ClientProjection(p) => self.rewrite_projection(expr, p),
            Expr::Subquery(_) => expr.clone(),
            Expr::Insert(_)
            | Expr::Update(_)
            | Expr::Delete(_)
            | Expr::Block(_)
            | Expr::If(_)
            | Expr::Declaration(_) => {
                self.is_top_level = true;
                rewrite_children(self, expr)
            }
            _ => rewrite_children(self, expr),
        }
    }
}
