use std::collections::HashSet;

use crate::analysis::is_redundant_subquery;
use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::{remove_selects, remove_selects_in, select_ref};
use crate::rules::Rule;

/// Splices out selects that pass the rows of their source through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveRedundantSubqueries;

impl Rule for RemoveRedundantSubqueries {
    fn name(&self) -> &'static str {
        "remove_redundant_subqueries"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(remove_redundant_subqueries(expr))
    }
}

pub fn remove_redundant_subqueries(expr: &ExprRef) -> ExprRef {
    RedundantSubqueryRemover {
        under_client_join: false,
    }
    .rewrite(expr)
}

/// Redundant selects among the row sources of a `from`. Selects are not entered: their own
/// sources were handled when they were rewritten.
fn redundant_sources(source: &Expr, aliases: &mut HashSet<TableAlias>) {
    match source {
        Expr::Select(s) if is_redundant_subquery(s) => {
            aliases.insert(s.alias);
        }
        Expr::Join(j) => {
            redundant_sources(&j.left, aliases);
            redundant_sources(&j.right, aliases);
        }
        _ => {}
    }
}

/// The select of a projection, if it can be replaced by the select it reads from.
fn redundant_projection_select(expr: &Expr) -> Option<TableAlias> {
    let select = expr.as_client_projection()?.select()?;
    let reads_select = matches!(&*select.from, Expr::Select(_));
    (is_redundant_subquery(select) && reads_select).then_some(select.alias)
}

struct RedundantSubqueryRemover {
    /// Set for the projection directly under a client join, whose inner keys also reference
    /// the projection's select and are substituted at the client join instead.
    under_client_join: bool,
}

impl ExprRewriter for RedundantSubqueryRemover {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Select(_) => {
                let rewritten = rewrite_children(self, expr);
                let select = match &*rewritten {
                    Expr::Select(s) => s,
                    _ => return rewritten,
                };
                let mut redundant = HashSet::new();
                redundant_sources(&select.from, &mut redundant);
                if redundant.is_empty() {
                    return rewritten;
                }
                log::trace!("removing redundant selects {:?} under {}", redundant, select.alias);
                select_ref(remove_selects_in(select, &redundant))
            }
            Expr::ClientProjection(_) => {
                let deferred = std::mem::take(&mut self.under_client_join);
                let rewritten = rewrite_children(self, expr);
                if deferred {
                    return rewritten;
                }
                match redundant_projection_select(&rewritten) {
                    Some(alias) => remove_selects(&rewritten, &HashSet::from([alias])),
                    None => rewritten,
                }
            }
            Expr::ClientJoin(_) => {
                self.under_client_join = true;
                let rewritten = rewrite_children(self, expr);
                self.under_client_join = false;
                match rewritten
                    .as_client_join()
                    .and_then(|j| redundant_projection_select(&j.projection))
                {
                    Some(alias) => remove_selects(&rewritten, &HashSet::from([alias])),
                    None => rewritten,
                }
            }
            _ => rewrite_children(self, expr),
        }
    }
}
