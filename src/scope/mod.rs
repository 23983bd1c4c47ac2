//! Alias scoping.
//!
//! [`walk`] threads a [`Scope`] through a recursive descent: while visiting the clauses of a
//! select, the aliases declared by its `from` are in scope; while visiting the right side of an
//! apply join, the aliases of its left side are; and so on. Passes that need scope information
//! implement [`ScopedVisitor`] instead of redoing that bookkeeping.

use std::collections::HashSet;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::expr::*;

mod scoped_map;
pub use scoped_map::*;
mod validity;
pub use validity::*;

/// What an alias in scope makes visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exposed {
    /// Tables: any column name may be referenced.
    AnyColumn,
    /// Selects: exactly the declared column names.
    Columns(Rc<HashSet<String>>),
}

impl Exposed {
    pub fn exposes(&self, column: &str) -> bool {
        match self {
            Exposed::AnyColumn => true,
            Exposed::Columns(names) => names.contains(column),
        }
    }
}

/// The aliases and variables visible at one point of a tree.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    sources: ScopedMap<TableAlias, Exposed>,
    variables: ScopedMap<Variable, DataType>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings every alias declared by `source` into the innermost frame.
    pub fn declare_source(&mut self, source: &Expr) {
        match source {
            Expr::Table(t) => {
                self.sources.insert(t.alias, Exposed::AnyColumn);
            }
            Expr::Select(s) => {
                let names = s.columns.iter().map(|c| c.name.clone()).collect();
                self.sources.insert(s.alias, Exposed::Columns(Rc::new(names)));
            }
            Expr::Join(j) => {
                self.declare_source(&j.left);
                self.declare_source(&j.right);
            }
            _ => {}
        }
    }

    pub fn declare_variable(&mut self, variable: Variable, data_type: DataType) {
        self.variables.insert(variable, data_type);
    }

    pub fn push(&mut self) {
        self.sources.push_frame();
        self.variables.push_frame();
    }

    pub fn pop(&mut self) {
        self.sources.pop_frame();
        self.variables.pop_frame();
    }

    pub fn lookup(&self, alias: TableAlias) -> Option<&Exposed> {
        self.sources.get(&alias)
    }

    pub fn contains(&self, alias: TableAlias) -> bool {
        self.sources.contains_key(&alias)
    }

    pub fn has_variable(&self, variable: &Variable) -> bool {
        self.variables.contains_key(variable)
    }

    pub fn aliases(&self) -> impl Iterator<Item = TableAlias> + '_ {
        self.sources.keys().copied()
    }
}

/// Callbacks of [`walk`]. Every hook has an empty default.
pub trait ScopedVisitor {
    /// A table or select declaring `alias` was reached.
    fn visit_declaration(&mut self, _alias: TableAlias) {}

    fn visit_column(&mut self, _column: &ColumnExpr, _scope: &Scope) {}

    fn visit_variable(&mut self, _variable: &VariableExpr, _scope: &Scope) {}
}

/// Visits `expr` and everything below it, keeping `scope` current. `scope` is left as it was
/// found, except for variables declared by a top-level declaration command.
pub fn walk<V: ScopedVisitor + ?Sized>(visitor: &mut V, expr: &Expr, scope: &mut Scope) {
    match expr {
        Expr::Table(t) => visitor.visit_declaration(t.alias),
        Expr::Column(c) => visitor.visit_column(c, scope),
        Expr::Variable(v) => visitor.visit_variable(v, scope),
        Expr::Select(s) => {
            walk(visitor, &s.from, scope);
            visitor.visit_declaration(s.alias);
            with_sources(scope, &[&s.from], |scope| {
                for child in expr.children().into_iter().skip(1) {
                    walk(visitor, child, scope);
                }
            });
        }
        Expr::Join(j) => {
            walk(visitor, &j.left, scope);
            if j.join_type.is_apply() {
                with_sources(scope, &[&j.left], |scope| walk(visitor, &j.right, scope));
            } else {
                walk(visitor, &j.right, scope);
            }
            if let Some(condition) = &j.condition {
                with_sources(scope, &[&j.left, &j.right], |scope| {
                    walk(visitor, condition, scope)
                });
            }
        }
        Expr::ClientProjection(p) => {
            walk(visitor, &p.select, scope);
            with_sources(scope, &[&p.select], |scope| {
                walk(visitor, &p.projector, scope)
            });
        }
        Expr::ClientJoin(j) => {
            walk(visitor, &j.projection, scope);
            for key in &j.outer_key {
                walk(visitor, key, scope);
            }
            if let Expr::ClientProjection(p) = &*j.projection {
                with_sources(scope, &[&p.select], |scope| {
                    for key in &j.inner_key {
                        walk(visitor, key, scope);
                    }
                });
            }
        }
        Expr::Insert(i) => {
            walk(visitor, &i.table, scope);
            with_sources(scope, &[&i.table], |scope| {
                for child in expr.children().into_iter().skip(1) {
                    walk(visitor, child, scope);
                }
            });
        }
        Expr::Update(u) => {
            walk(visitor, &u.table, scope);
            with_sources(scope, &[&u.table], |scope| {
                for child in expr.children().into_iter().skip(1) {
                    walk(visitor, child, scope);
                }
            });
        }
        Expr::Delete(d) => {
            walk(visitor, &d.table, scope);
            with_sources(scope, &[&d.table], |scope| {
                for child in expr.children().into_iter().skip(1) {
                    walk(visitor, child, scope);
                }
            });
        }
        Expr::Block(b) => {
            scope.push();
            for command in &b.commands {
                walk(visitor, command, scope);
            }
            scope.pop();
        }
        Expr::Declaration(d) => {
            match &d.source {
                Some(source) => {
                    walk(visitor, source, scope);
                    with_sources(scope, &[source], |scope| {
                        for v in &d.variables {
                            walk(visitor, &v.expr, scope);
                        }
                    });
                }
                None => {
                    for v in &d.variables {
                        walk(visitor, &v.expr, scope);
                    }
                }
            }
            for v in &d.variables {
                scope.declare_variable(v.variable.clone(), v.data_type);
            }
        }
        _ => expr.for_each_child(|child| walk(visitor, child, scope)),
    }
}

fn with_sources<F>(scope: &mut Scope, sources: &[&ExprRef], f: F)
where
    F: FnOnce(&mut Scope),
{
    scope.push();
    for source in sources {
        scope.declare_source(source);
    }
    f(scope);
    scope.pop();
}

/// Aliases a row source makes visible to its consumer: a table or select declares its own alias,
/// a join declares whatever its sides declare. Does not look inside a select's `from`.
pub fn declared_aliases(source: &Expr) -> SmallVec<[TableAlias; 4]> {
    let mut aliases = SmallVec::new();
    gather_declared(source, &mut aliases);
    aliases
}

fn gather_declared(source: &Expr, aliases: &mut SmallVec<[TableAlias; 4]>) {
    match source {
        Expr::Table(t) => aliases.push(t.alias),
        Expr::Select(s) => aliases.push(s.alias),
        Expr::Join(j) => {
            gather_declared(&j.left, aliases);
            gather_declared(&j.right, aliases);
        }
        _ => {}
    }
}

/// Every alias declared anywhere in `expr`, including nested selects and subqueries.
pub fn all_declared_aliases(expr: &Expr) -> HashSet<TableAlias> {
    struct Declarations(HashSet<TableAlias>);
    impl ScopedVisitor for Declarations {
        fn visit_declaration(&mut self, alias: TableAlias) {
            self.0.insert(alias);
        }
    }
    let mut visitor = Declarations(HashSet::new());
    walk(&mut visitor, expr, &mut Scope::new());
    visitor.0
}

/// Aliases referenced by any column below `expr`, wherever they are declared.
pub fn referenced_aliases(expr: &Expr) -> HashSet<TableAlias> {
    let mut aliases = HashSet::new();
    expr.any(&mut |e| {
        if let Expr::Column(c) = e {
            aliases.insert(c.alias);
        }
        false
    });
    aliases
}

/// Column references below `expr` whose alias is not declared inside `expr`.
pub fn external_references(expr: &Expr) -> Vec<ColumnExpr> {
    struct External(Vec<ColumnExpr>);
    impl ScopedVisitor for External {
        fn visit_column(&mut self, column: &ColumnExpr, scope: &Scope) {
            if !scope.contains(column.alias) {
                self.0.push(column.clone());
            }
        }
    }
    let mut visitor = External(Vec::new());
    walk(&mut visitor, expr, &mut Scope::new());
    visitor.0
}

/// Aliases of [`external_references`].
pub fn external_aliases(expr: &Expr) -> HashSet<TableAlias> {
    external_references(expr).into_iter().map(|c| c.alias).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_right_side_sees_left() {
        let a = table("A");
        let b = table("B");
        let (aa, ba) = (a.declared_alias().unwrap(), b.declared_alias().unwrap());
        let correlated = SelectBuilder::new(b)
            .column("x", col(ba, "x", DataType::Int64))
            .filter(eq(col(ba, "a_id", DataType::Int64), col(aa, "id", DataType::Int64)))
            .build_ref();
        let ca = correlated.declared_alias().unwrap();

        let applied = join(JoinType::OuterApply, a, correlated.clone(), None);
        assert_eq!(declared_aliases(&applied).as_slice(), &[aa, ca]);
        assert!(external_aliases(&applied).is_empty());
        assert_eq!(external_aliases(&correlated), HashSet::from([aa]));
        assert!(referenced_aliases(&applied).contains(&aa));
    }

    #[test]
    fn test_all_declared_aliases_includes_nested() {
        let t = table("T");
        let ta = t.declared_alias().unwrap();
        let inner = SelectBuilder::new(t)
            .column("x", col(ta, "x", DataType::Int64))
            .build();
        let ia = inner.alias;
        let outer = SelectBuilder::new(Expr::Select(inner).into_ref())
            .column("x", col(ia, "x", DataType::Int64))
            .build_ref();
        let oa = outer.declared_alias().unwrap();
        assert_eq!(all_declared_aliases(&outer), HashSet::from([ta, ia, oa]));
        assert_eq!(declared_aliases(&outer).as_slice(), &[oa]);
    }
}
