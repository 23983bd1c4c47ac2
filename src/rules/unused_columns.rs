use std::collections::{HashMap, HashSet};

use crate::analysis::has_aggregates;
use crate::error::OptResult;
use crate::expr::*;
use crate::optimizer::OptimizerContext;
use crate::rewrite::select_ref;
use crate::rules::Rule;

/// Drops select columns nothing above references, and singleton left outer joins whose right side
/// is no longer referenced.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveUnusedColumns;

impl Rule for RemoveUnusedColumns {
    fn name(&self) -> &'static str {
        "remove_unused_columns"
    }

    fn apply(&self, expr: &ExprRef, _context: &OptimizerContext) -> OptResult<ExprRef> {
        Ok(remove_unused_columns(expr))
    }
}

/// The columns of a bare select at the root are its result and are always kept.
pub fn remove_unused_columns(expr: &ExprRef) -> ExprRef {
    let mut marker = UsageMarker {
        retain_all: matches!(&**expr, Expr::Select(_)),
        ..Default::default()
    };
    marker.mark(expr);
    let mut sweeper = ColumnSweeper { usage: &marker };
    sweeper.rewrite(expr)
}

/// Walks the tree top-down, every consumer before what it consumes, and records which columns of
/// each select are referenced.
#[derive(Default)]
struct UsageMarker {
    used: HashMap<TableAlias, HashSet<String>>,
    /// Selects whose columns all stay: the root, distinct selects, and sources of `count(*)`.
    keep_all: HashSet<TableAlias>,
    /// Right aliases of singleton left outer joins that can go.
    dropped_joins: HashSet<TableAlias>,
    /// Applies to the next row source marked, i.e. the `from` being entered.
    retain_all: bool,
    counts_rows: bool,
}

impl UsageMarker {
    fn is_used(&self, alias: TableAlias, name: &str) -> bool {
        self.used.get(&alias).map_or(false, |u| u.contains(name))
    }

    fn use_column(&mut self, alias: TableAlias, name: &str) {
        self.used.entry(alias).or_default().insert(name.to_string());
    }

    fn mark_all<'a, I>(&mut self, exprs: I)
    where
        I: IntoIterator<Item = &'a ExprRef>,
    {
        for expr in exprs {
            self.mark(expr);
        }
    }

    fn mark(&mut self, expr: &ExprRef) {
        match &**expr {
            Expr::Column(c) => self.use_column(c.alias, &c.name),
            Expr::Table(_) => self.retain_all = false,
            Expr::Select(s) => {
                let retained = std::mem::replace(&mut self.retain_all, false);
                let outer_counts = std::mem::replace(&mut self.counts_rows, false);
                let keep_all = retained
                    || s.distinct
                    || (s.group_by.is_empty() && has_aggregates(s));
                if keep_all {
                    self.keep_all.insert(s.alias);
                }
                for column in s.columns.iter().rev() {
                    if keep_all || self.is_used(s.alias, &column.name) {
                        self.mark(&column.expr);
                    }
                }
                self.mark_all(s.take.iter());
                self.mark_all(s.skip.iter());
                self.mark_all(s.group_by.iter().rev());
                self.mark_all(s.order_by.iter().rev().map(|o| &o.expr));
                self.mark_all(s.filter.iter());
                self.retain_all = self.counts_rows;
                self.mark(&s.from);
                self.retain_all = false;
                self.counts_rows = outer_counts;
            }
            Expr::Join(j) => {
                let retained = std::mem::replace(&mut self.retain_all, false);
                if j.join_type == JoinType::SingletonLeftOuter && !retained {
                    if let Some(right) = j.right.declared_alias() {
                        if !self.used.contains_key(&right) {
                            self.dropped_joins.insert(right);
                            self.mark(&j.left);
                            return;
                        }
                    }
                }
                self.mark_all(j.condition.iter());
                self.retain_all = retained;
                self.mark(&j.right);
                self.retain_all = retained;
                self.mark(&j.left);
                self.retain_all = false;
            }
            Expr::Aggregate(a) => {
                if a.is_count_star() {
                    self.counts_rows = true;
                }
                self.mark_all(a.argument.iter());
            }
            Expr::Subquery(s) => {
                if let (SubqueryKind::Scalar | SubqueryKind::In { .. }, Expr::Select(select)) =
                    (&s.kind, &*s.select)
                {
                    if let Some(first) = select.columns.first() {
                        self.use_column(select.alias, &first.name);
                    }
                }
                self.mark(&s.select);
                if let SubqueryKind::In { operand } = &s.kind {
                    self.mark(operand);
                }
            }
            _ => {
                for child in expr.children().into_iter().rev() {
                    self.mark(child);
                }
            }
        }
    }
}

struct ColumnSweeper<'a> {
    usage: &'a UsageMarker,
}

impl<'a> ExprRewriter for ColumnSweeper<'a> {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Select(s) if !self.usage.keep_all.contains(&s.alias) => {
                let columns: Vec<ColumnDeclaration> = s
                    .columns
                    .iter()
                    .filter(|c| self.usage.is_used(s.alias, &c.name))
                    .cloned()
                    .collect();
                if columns.len() == s.columns.len() {
                    rewrite_children(self, expr)
                } else {
                    let dropped = s.columns.len() - columns.len();
                    log::trace!("{}: dropping {} columns", s.alias, dropped);
                    rewrite_children(self, &select_ref(s.clone().with_columns(columns)))
                }
            }
            Expr::Join(j)
                if j.join_type == JoinType::SingletonLeftOuter
                    && j
                        .right
                        .declared_alias()
                        .map_or(false, |a| self.usage.dropped_joins.contains(&a)) =>
            {
                self.rewrite(&j.left)
            }
            _ => rewrite_children(self, expr),
        }
    }
}
