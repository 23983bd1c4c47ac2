//! Reference validity checker.
//!
//! A tree is valid when every column reference resolves to an alias in scope that exposes the
//! referenced name, every variable is declared before use, and no alias is declared twice. The
//! pipeline runs this after every structural rule; a failure is always an optimizer defect.

use std::collections::HashSet;

use crate::error::ReferenceError;
use crate::expr::{ColumnExpr, Expr, TableAlias, VariableExpr};
use crate::scope::{walk, Scope, ScopedVisitor};

#[derive(Default)]
struct ValidityChecker {
    declared: HashSet<TableAlias>,
    error: Option<ReferenceError>,
}

impl ValidityChecker {
    fn fail(&mut self, error: ReferenceError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

impl ScopedVisitor for ValidityChecker {
    fn visit_declaration(&mut self, alias: TableAlias) {
        if !self.declared.insert(alias) {
            self.fail(ReferenceError::DuplicateAlias(alias));
        }
    }

    fn visit_column(&mut self, column: &ColumnExpr, scope: &Scope) {
        match scope.lookup(column.alias) {
            None => self.fail(ReferenceError::UnknownAlias {
                alias: column.alias,
                column: column.name.clone(),
            }),
            Some(exposed) if !exposed.exposes(&column.name) => {
                self.fail(ReferenceError::UnknownColumn {
                    alias: column.alias,
                    column: column.name.clone(),
                })
            }
            Some(_) => {}
        }
    }

    fn visit_variable(&mut self, variable: &VariableExpr, scope: &Scope) {
        if !scope.has_variable(&variable.variable) {
            self.fail(ReferenceError::UndeclaredVariable(
                variable.variable.to_string(),
            ));
        }
    }
}

/// Checks `expr`, treating everything visible in `outer_scope` as declared by an enclosing tree.
/// Reports the first violation in traversal order.
pub fn check_references(expr: &Expr, outer_scope: Option<&Scope>) -> Result<(), ReferenceError> {
    let mut scope = outer_scope.cloned().unwrap_or_default();
    let mut checker = ValidityChecker::default();
    walk(&mut checker, expr, &mut scope);
    match checker.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

pub fn has_valid_references(expr: &Expr, outer_scope: Option<&Scope>) -> bool {
    check_references(expr, outer_scope).is_ok()
}
