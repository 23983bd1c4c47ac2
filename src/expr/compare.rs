//! Structural comparison of query trees modulo alias renaming.

use crate::expr::*;
use crate::scope::{declared_aliases, ScopedMap};

/// Compares two trees structurally, treating an alias of the left tree as equal to an alias of the
/// right tree when both are declared at corresponding positions (or were paired up front).
///
/// Tables compare by name and entity only, so two scans of the same table with different aliases
/// are equal, and every column reference through those aliases is then compared under that
/// correspondence.
pub struct ExprComparer {
    aliases: ScopedMap<TableAlias, TableAlias>,
    variables: ScopedMap<Variable, Variable>,
}

impl Default for ExprComparer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprComparer {
    pub fn new() -> Self {
        Self {
            aliases: ScopedMap::new(),
            variables: ScopedMap::new(),
        }
    }

    /// A comparer that already treats each `(left, right)` pair as the same alias.
    pub fn with_aliases<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (TableAlias, TableAlias)>,
    {
        let mut comparer = Self::new();
        for (a, b) in pairs {
            comparer.aliases.insert(a, b);
        }
        comparer
    }

    pub fn equal(&mut self, a: &Expr, b: &Expr) -> bool {
        match (a, b) {
            (Expr::Table(a), Expr::Table(b)) => a.name == b.name && a.entity == b.entity,
            (Expr::Select(a), Expr::Select(b)) => self.equal_select(a, b),
            (Expr::Join(a), Expr::Join(b)) => self.equal_join(a, b),
            (Expr::Column(a), Expr::Column(b)) => {
                let alias = self.aliases.get(&a.alias).copied().unwrap_or(a.alias);
                alias == b.alias && a.name == b.name && a.data_type == b.data_type
            }
            (Expr::Literal(a), Expr::Literal(b)) => a == b,
            (Expr::Parameter(a), Expr::Parameter(b)) => a == b,
            (Expr::Binary(a), Expr::Binary(b)) => {
                a.op == b.op && self.equal(&a.left, &b.left) && self.equal(&a.right, &b.right)
            }
            (Expr::Unary(a), Expr::Unary(b)) => a.op == b.op && self.equal(&a.expr, &b.expr),
            (Expr::Function(a), Expr::Function(b)) => {
                a.name == b.name && a.data_type == b.data_type && self.equal_list(&a.args, &b.args)
            }
            (Expr::Aggregate(a), Expr::Aggregate(b)) => {
                a.function == b.function
                    && a.distinct == b.distinct
                    && a.data_type == b.data_type
                    && self.equal_opt(&a.argument, &b.argument)
            }
            (Expr::Subquery(a), Expr::Subquery(b)) => {
                let kinds = match (&a.kind, &b.kind) {
                    (SubqueryKind::Scalar, SubqueryKind::Scalar)
                    | (SubqueryKind::Exists, SubqueryKind::Exists) => true,
                    (SubqueryKind::In { operand: x }, SubqueryKind::In { operand: y }) => {
                        self.equal(x, y)
                    }
                    _ => false,
                };
                kinds && a.data_type == b.data_type && self.equal(&a.select, &b.select)
            }
            (Expr::OuterJoined(a), Expr::OuterJoined(b)) => {
                self.equal(&a.test, &b.test) && self.equal(&a.expr, &b.expr)
            }
            (Expr::Variable(a), Expr::Variable(b)) => {
                let variable = self
                    .variables
                    .get(&a.variable)
                    .cloned()
                    .unwrap_or_else(|| a.variable.clone());
                variable == b.variable && a.data_type == b.data_type
            }
            (Expr::Member(a), Expr::Member(b)) => {
                a.member == b.member && self.equal(&a.expr, &b.expr)
            }
            (Expr::Entity(a), Expr::Entity(b)) => {
                a.entity == b.entity && self.equal_fields(&a.fields, &b.fields)
            }
            (Expr::Record(a), Expr::Record(b)) => self.equal_fields(&a.fields, &b.fields),
            (Expr::ClientProjection(a), Expr::ClientProjection(b)) => {
                a.aggregator == b.aggregator
                    && a.origin == b.origin
                    && self.equal(&a.select, &b.select)
                    && self.scoped(&a.select, &b.select, |c| c.equal(&a.projector, &b.projector))
            }
            (Expr::ClientJoin(a), Expr::ClientJoin(b)) => {
                if !(self.equal(&a.projection, &b.projection)
                    && self.equal_list(&a.outer_key, &b.outer_key))
                {
                    return false;
                }
                match (&*a.projection, &*b.projection) {
                    (Expr::ClientProjection(pa), Expr::ClientProjection(pb)) => self
                        .scoped(&pa.select, &pb.select, |c| {
                            c.equal_list(&a.inner_key, &b.inner_key)
                        }),
                    _ => false,
                }
            }
            (Expr::Insert(a), Expr::Insert(b)) => {
                self.equal(&a.table, &b.table)
                    && self.scoped(&a.table, &b.table, |c| {
                        c.equal_assignments(&a.assignments, &b.assignments)
                    })
            }
            (Expr::Update(a), Expr::Update(b)) => {
                self.equal(&a.table, &b.table)
                    && self.scoped(&a.table, &b.table, |c| {
                        c.equal_opt(&a.filter, &b.filter)
                            && c.equal_assignments(&a.assignments, &b.assignments)
                    })
            }
            (Expr::Delete(a), Expr::Delete(b)) => {
                self.equal(&a.table, &b.table)
                    && self.scoped(&a.table, &b.table, |c| c.equal_opt(&a.filter, &b.filter))
            }
            (Expr::Block(a), Expr::Block(b)) => {
                self.variables.push_frame();
                let equal = self.equal_list(&a.commands, &b.commands);
                self.variables.pop_frame();
                equal
            }
            (Expr::If(a), Expr::If(b)) => {
                self.equal(&a.check, &b.check)
                    && self.equal(&a.then, &b.then)
                    && self.equal_opt(&a.otherwise, &b.otherwise)
            }
            (Expr::Declaration(a), Expr::Declaration(b)) => {
                if a.variables.len() != b.variables.len() || !self.equal_opt(&a.source, &b.source) {
                    return false;
                }
                let values_equal = match (&a.source, &b.source) {
                    (Some(sa), Some(sb)) => self.scoped(sa, sb, |c| c.equal_declarations(a, b)),
                    _ => self.equal_declarations(a, b),
                };
                if values_equal {
                    for (va, vb) in a.variables.iter().zip(&b.variables) {
                        self.variables.insert(va.variable.clone(), vb.variable.clone());
                    }
                }
                values_equal
            }
            _ => false,
        }
    }

    fn equal_select(&mut self, a: &SelectExpr, b: &SelectExpr) -> bool {
        if a.distinct != b.distinct
            || a.reverse != b.reverse
            || a.columns.len() != b.columns.len()
            || a.order_by.len() != b.order_by.len()
            || !self.equal(&a.from, &b.from)
        {
            return false;
        }
        self.scoped(&a.from, &b.from, |c| {
            c.equal_opt(&a.filter, &b.filter)
                && a.columns.iter().zip(&b.columns).all(|(x, y)| {
                    x.name == y.name && x.data_type == y.data_type && c.equal(&x.expr, &y.expr)
                })
                && a
                    .order_by
                    .iter()
                    .zip(&b.order_by)
                    .all(|(x, y)| x.direction == y.direction && c.equal(&x.expr, &y.expr))
                && c.equal_list(&a.group_by, &b.group_by)
                && c.equal_opt(&a.skip, &b.skip)
                && c.equal_opt(&a.take, &b.take)
        })
    }

    fn equal_join(&mut self, a: &JoinExpr, b: &JoinExpr) -> bool {
        if a.join_type != b.join_type || !self.equal(&a.left, &b.left) {
            return false;
        }
        let right_equal = if a.join_type.is_apply() {
            self.scoped(&a.left, &b.left, |c| c.equal(&a.right, &b.right))
        } else {
            self.equal(&a.right, &b.right)
        };
        right_equal
            && self.scoped(&a.left, &b.left, |c| {
                c.scoped(&a.right, &b.right, |c| c.equal_opt(&a.condition, &b.condition))
            })
    }

    /// Runs `f` with the aliases declared by `a` mapped onto those declared by `b`.
    fn scoped<F>(&mut self, a: &Expr, b: &Expr, f: F) -> bool
    where
        F: FnOnce(&mut Self) -> bool,
    {
        let declared_a = declared_aliases(a);
        let declared_b = declared_aliases(b);
        if declared_a.len() != declared_b.len() {
            return false;
        }
        self.aliases.push_frame();
        for (x, y) in declared_a.into_iter().zip(declared_b) {
            self.aliases.insert(x, y);
        }
        let equal = f(self);
        self.aliases.pop_frame();
        equal
    }

    fn equal_opt(&mut self, a: &Option<ExprRef>, b: &Option<ExprRef>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => self.equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    fn equal_list(&mut self, a: &[ExprRef], b: &[ExprRef]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.equal(x, y))
    }

    fn equal_fields(&mut self, a: &[FieldBinding], b: &[FieldBinding]) -> bool {
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|(x, y)| x.member == y.member && self.equal(&x.expr, &y.expr))
    }

    fn equal_assignments(&mut self, a: &[ColumnAssignment], b: &[ColumnAssignment]) -> bool {
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|(x, y)| self.equal(&x.column, &y.column) && self.equal(&x.value, &y.value))
    }

    fn equal_declarations(&mut self, a: &DeclarationCommand, b: &DeclarationCommand) -> bool {
        a.variables.iter().zip(&b.variables).all(|(x, y)| {
            x.data_type == y.data_type
                && x.variable.name() == y.variable.name()
                && self.equal(&x.expr, &y.expr)
        })
    }
}

/// Structural equality modulo alias renaming.
pub fn equivalent(a: &Expr, b: &Expr) -> bool {
    ExprComparer::new().equal(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_from(name: &str) -> ExprRef {
        let t = table(name);
        let a = t.declared_alias().unwrap();
        SelectBuilder::new(t)
            .column("id", col(a, "id", DataType::Int64))
            .filter(eq(col(a, "id", DataType::Int64), lit(7)))
            .build_ref()
    }

    #[test]
    fn test_renamed_trees_are_equivalent() {
        let a = select_from("Orders");
        let b = select_from("Orders");
        assert_ne!(a, b);
        assert!(equivalent(&a, &b));
        assert!(!equivalent(&a, &select_from("Customers")));
    }

    #[test]
    fn test_unpaired_aliases_differ() {
        let x = TableAlias::new();
        let y = TableAlias::new();
        let a = col(x, "id", DataType::Int64);
        let b = col(y, "id", DataType::Int64);
        assert!(!equivalent(&a, &b));
        assert!(ExprComparer::with_aliases([(x, y)]).equal(&a, &b));
    }
}
