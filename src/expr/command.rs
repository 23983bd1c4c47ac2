//! Data manipulation commands.

use crate::expr::{DataType, ExprRef, Variable};

/// `column = value` inside an insert or update. `column` references the command's table alias.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnAssignment {
    pub column: ExprRef,
    pub value: ExprRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertCommand {
    /// Always a table node.
    pub table: ExprRef,
    pub assignments: Vec<ColumnAssignment>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateCommand {
    pub table: ExprRef,
    pub filter: Option<ExprRef>,
    pub assignments: Vec<ColumnAssignment>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteCommand {
    pub table: ExprRef,
    pub filter: Option<ExprRef>,
}

/// Commands executed in order. Variables declared by an earlier command are visible to the
/// later ones.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockCommand {
    pub commands: Vec<ExprRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfCommand {
    pub check: ExprRef,
    pub then: ExprRef,
    pub otherwise: Option<ExprRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDeclaration {
    pub variable: Variable,
    pub data_type: DataType,
    /// Evaluated in the scope of the declaring command's source select, if any.
    pub expr: ExprRef,
}

/// Captures values, typically a generated key, for use by later commands of the same block.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclarationCommand {
    pub variables: Vec<VariableDeclaration>,
    pub source: Option<ExprRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableExpr {
    pub variable: Variable,
    pub data_type: DataType,
}
