use std::collections::HashSet;

use crate::analysis::contains_aggregate;
use crate::expr::*;
use crate::rewrite::available_column_name;
use crate::scope::external_aliases;

/// Result of [`project_columns`].
#[derive(Clone, Debug)]
pub struct ProjectedColumns {
    /// The projector, now referencing only columns of the new alias.
    pub projector: ExprRef,
    /// The existing columns followed by the ones added for the projector.
    pub columns: Vec<ColumnDeclaration>,
}

/// Moves the server-side parts of `projector` into column declarations of a select that will be
/// declared as `new_alias`.
///
/// Column references to one of `existing_aliases` become columns, and so do whole subqueries that
/// only depend on those aliases. References inside nested client projections are hoisted as well,
/// which keeps the nested selects correlated to the new select. An expression already computed by
/// one of `existing_columns` reuses that column.
pub fn project_columns(
    projector: &ExprRef,
    existing_columns: &[ColumnDeclaration],
    new_alias: TableAlias,
    existing_aliases: &HashSet<TableAlias>,
) -> ProjectedColumns {
    let mut projector_columns = ColumnProjector {
        existing_aliases,
        new_alias,
        columns: existing_columns.to_vec(),
    };
    let projector = projector_columns.rewrite(projector);
    ProjectedColumns {
        projector,
        columns: projector_columns.columns,
    }
}

struct ColumnProjector<'a> {
    existing_aliases: &'a HashSet<TableAlias>,
    new_alias: TableAlias,
    columns: Vec<ColumnDeclaration>,
}

impl<'a> ColumnProjector<'a> {
    fn declare(&mut self, expr: &ExprRef, base: &str) -> ExprRef {
        let data_type = expr.data_type();
        let name = match self.columns.iter().find(|c| c.expr == *expr) {
            Some(existing) => existing.name.clone(),
            None => {
                let name = available_column_name(&self.columns, base);
                self.columns
                    .push(ColumnDeclaration::new(name.clone(), expr.clone(), data_type));
                name
            }
        };
        col(self.new_alias, name, data_type)
    }

    fn is_server_subquery(&self, expr: &Expr) -> bool {
        !contains_aggregate(expr)
            && external_aliases(expr)
                .iter()
                .all(|a| self.existing_aliases.contains(a))
    }
}

impl<'a> ExprRewriter for ColumnProjector<'a> {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        match &**expr {
            Expr::Column(c) if self.existing_aliases.contains(&c.alias) => {
                let base = c.name.clone();
                self.declare(expr, &base)
            }
            Expr::Subquery(_) if self.is_server_subquery(expr) => {
                let base = format!("c{}", self.columns.len());
                self.declare(expr, &base)
            }
            _ => rewrite_children(self, expr),
        }
    }
}
