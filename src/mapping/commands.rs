use std::collections::HashMap;

use crate::error::{OptError, OptResult};
use crate::expr::*;
use crate::mapping::{dependency_order, ColumnMapping, QueryMapping, TableMapping};

/// Value of one column member in a command.
pub type MemberValue<'a> = (&'a str, ExprRef);

fn value_of<'a>(values: &'a [MemberValue<'_>], member: &str) -> Option<&'a ExprRef> {
    values.iter().find(|(m, _)| *m == member).map(|(_, v)| v)
}

fn key_columns(columns: &[ColumnMapping]) -> impl Iterator<Item = &ColumnMapping> {
    columns.iter().filter(|c| c.primary_key)
}

/// Key column `key` as stored in `table`. Dependent tables repeat the primary key columns
/// under their own names.
fn key_column(table: TableAlias, key: &ColumnMapping) -> ExprRef {
    col(table, key.column.clone(), key.data_type)
}

fn key_filter<F>(
    table: TableAlias,
    columns: &[ColumnMapping],
    mut key_value: F,
) -> OptResult<Option<ExprRef>>
where
    F: FnMut(&ColumnMapping) -> OptResult<ExprRef>,
{
    let mut predicates = Vec::new();
    for key in key_columns(columns) {
        predicates.push(eq(key_column(table, key), key_value(key)?));
    }
    Ok(conjunction(predicates))
}

fn missing_key(entity: &EntityDescriptor, key: &ColumnMapping) -> anyhow::Error {
    OptError::UnknownMember {
        entity: entity.to_string(),
        member: key.member.clone(),
    }
    .into()
}

fn table_alias(table: &ExprRef) -> OptResult<TableAlias> {
    table
        .declared_alias()
        .ok_or_else(|| OptError::Unsupported("command target is not a table".to_string()).into())
}

/// Inserts one instance of `entity` with the given member values.
///
/// Tables are written in dependency order. If the primary key is generated, the primary insert
/// leaves it out and a declaration right after it captures the assigned value into a variable,
/// which the dependent inserts use as their key.
pub fn insert_entity(
    mapping: &dyn QueryMapping,
    entity: &EntityDescriptor,
    values: &[MemberValue<'_>],
) -> OptResult<ExprRef> {
    let tables = dependency_order(mapping, entity)?;
    let columns = mapping.columns(entity)?;
    let mut generated: HashMap<String, ExprRef> = HashMap::new();
    let mut commands = Vec::new();

    for (idx, table) in tables.iter().enumerate() {
        let target = entity_table(entity, table.name.clone());
        let alias = table_alias(&target)?;
        let mut assignments = Vec::new();
        for column in &columns {
            let stored_here = column.table == table.name || (column.primary_key && idx > 0);
            if !stored_here {
                continue;
            }
            let value = match (column.generated, generated.get(&column.member)) {
                (true, None) => continue,
                (true, Some(variable)) => variable.clone(),
                (false, _) => match value_of(values, &column.member) {
                    Some(value) => value.clone(),
                    None => continue,
                },
            };
            assignments.push(ColumnAssignment {
                column: col(alias, column.column.clone(), column.data_type),
                value,
            });
        }
        commands.push(Expr::Insert(InsertCommand {
            table: target,
            assignments,
        })
        .into_ref());

        if idx == 0 {
            let variables: Vec<VariableDeclaration> = key_columns(&columns)
                .filter(|k| k.generated)
                .map(|k| VariableDeclaration {
                    variable: Variable::new(&k.member),
                    data_type: k.data_type,
                    expr: mapping.generated_key(table, k),
                })
                .collect();
            if !variables.is_empty() {
                for v in &variables {
                    generated.insert(
                        v.variable.name().to_string(),
                        Expr::Variable(VariableExpr {
                            variable: v.variable.clone(),
                            data_type: v.data_type,
                        })
                        .into_ref(),
                    );
                }
                commands.push(
                    Expr::Declaration(DeclarationCommand {
                        variables,
                        source: None,
                    })
                    .into_ref(),
                );
            }
        }
    }
    log::debug!("insert of {} spans {} commands", entity, commands.len());
    Ok(Expr::Block(BlockCommand { commands }).into_ref())
}

/// Updates the instance of `entity` identified by `key` (key member values).
///
/// Each table holding one of the updated members gets its own update. With
/// `check_existence`, the updates only run if the primary row exists.
pub fn update_entity(
    mapping: &dyn QueryMapping,
    entity: &EntityDescriptor,
    key: &[MemberValue<'_>],
    values: &[MemberValue<'_>],
    check_existence: bool,
) -> OptResult<ExprRef> {
    let tables = dependency_order(mapping, entity)?;
    let columns = mapping.columns(entity)?;
    let mut commands = Vec::new();

    for table in &tables {
        let assigned: Vec<&ColumnMapping> = columns
            .iter()
            .filter(|c| c.table == table.name && !c.primary_key)
            .filter(|c| value_of(values, &c.member).is_some())
            .collect();
        if assigned.is_empty() {
            continue;
        }
        let target = entity_table(entity, table.name.clone());
        let alias = table_alias(&target)?;
        let filter = key_filter(alias, &columns, |k| {
            value_of(key, &k.member)
                .cloned()
                .ok_or_else(|| missing_key(entity, k))
        })?;
        let assignments = assigned
            .into_iter()
            .filter_map(|c| {
                value_of(values, &c.member).map(|value| ColumnAssignment {
                    column: col(alias, c.column.clone(), c.data_type),
                    value: value.clone(),
                })
            })
            .collect();
        commands.push(
            Expr::Update(UpdateCommand {
                table: target,
                filter,
                assignments,
            })
            .into_ref(),
        );
    }

    let block = Expr::Block(BlockCommand { commands }).into_ref();
    if !check_existence {
        return Ok(block);
    }
    let primary = tables.first().ok_or_else(|| OptError::InconsistentMapping {
        entity: entity.to_string(),
        reason: "no tables".to_string(),
    })?;
    let check = exists(existence_query(entity, primary, &columns, key)?);
    Ok(Expr::If(IfCommand {
        check,
        then: block,
        otherwise: None,
    })
    .into_ref())
}

fn existence_query(
    entity: &EntityDescriptor,
    primary: &TableMapping,
    columns: &[ColumnMapping],
    key: &[MemberValue<'_>],
) -> OptResult<SelectExpr> {
    let source = entity_table(entity, primary.name.clone());
    let alias = table_alias(&source)?;
    let filter = key_filter(alias, columns, |k| {
        value_of(key, &k.member)
            .cloned()
            .ok_or_else(|| missing_key(entity, k))
    })?;
    Ok(SelectBuilder::new(source)
        .column("exists", lit(1))
        .build()
        .with_filter(filter))
}

/// Deletes the instance of `entity` identified by `key`, dependents first.
pub fn delete_entity(
    mapping: &dyn QueryMapping,
    entity: &EntityDescriptor,
    key: &[MemberValue<'_>],
) -> OptResult<ExprRef> {
    let tables = dependency_order(mapping, entity)?;
    let columns = mapping.columns(entity)?;
    let mut commands = Vec::new();
    for table in tables.iter().rev() {
        let target = entity_table(entity, table.name.clone());
        let alias = table_alias(&target)?;
        let filter = key_filter(alias, &columns, |k| {
            value_of(key, &k.member)
                .cloned()
                .ok_or_else(|| missing_key(entity, k))
        })?;
        commands.push(Expr::Delete(DeleteCommand { table: target, filter }).into_ref());
    }
    Ok(Expr::Block(BlockCommand { commands }).into_ref())
}
