use std::collections::{HashMap, HashSet};

use crate::error::{OptError, OptResult};
use crate::expr::*;
use crate::mapping::{
    dependency_order, ColumnMapping, MemberKind, QueryMapping, QueryPolicy,
    RelationshipProjection, TableMapping, LAST_IDENTITY_FUNCTION,
};

#[derive(Clone, Debug, PartialEq, Eq)]
struct RelationshipMapping {
    member: String,
    target: EntityDescriptor,
    source_keys: Vec<String>,
    target_keys: Vec<String>,
    singleton: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum MemberMapping {
    Column(ColumnMapping),
    Nested {
        member: String,
        entity: EntityDescriptor,
    },
    Relationship(RelationshipMapping),
}

impl MemberMapping {
    fn member(&self) -> &str {
        match self {
            MemberMapping::Column(c) => &c.member,
            MemberMapping::Nested { member, .. } => member,
            MemberMapping::Relationship(r) => &r.member,
        }
    }
}

/// Declares how one entity is stored.
///
/// Columns of an embedded entity are read from the owner's table of the same name, or from the
/// owner's primary table if the owner has no such table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityMapping {
    descriptor: EntityDescriptor,
    tables: Vec<TableMapping>,
    members: Vec<MemberMapping>,
}

impl EntityMapping {
    pub fn new<S: AsRef<str>, T: Into<String>>(entity: S, primary_table: T) -> Self {
        Self {
            descriptor: EntityDescriptor::new(entity),
            tables: vec![TableMapping {
                name: primary_table.into(),
                depends_on: vec![],
            }],
            members: vec![],
        }
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    fn primary_table(&self) -> &str {
        &self.tables[0].name
    }

    /// A dependent table holding more columns of the entity, keyed by the same primary key
    /// columns as the tables it depends on.
    pub fn dependent_table<S: Into<String>>(mut self, name: S, depends_on: &[&str]) -> Self {
        self.tables.push(TableMapping {
            name: name.into(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    fn push_column(
        mut self,
        member: &str,
        table: Option<&str>,
        column: &str,
        data_type: DataType,
        primary_key: bool,
        generated: bool,
    ) -> Self {
        let table = table.unwrap_or_else(|| self.primary_table()).to_string();
        self.members.push(MemberMapping::Column(ColumnMapping {
            member: member.to_string(),
            table,
            column: column.to_string(),
            data_type,
            primary_key,
            generated,
        }));
        self
    }

    /// A primary key member stored in the primary table under its own name.
    pub fn key(self, member: &str, data_type: DataType) -> Self {
        self.push_column(member, None, member, data_type, true, false)
    }

    /// A primary key member whose value the database assigns on insert.
    pub fn generated_key(self, member: &str, data_type: DataType) -> Self {
        self.push_column(member, None, member, data_type, true, true)
    }

    /// A member stored in the primary table under its own name.
    pub fn column(self, member: &str, data_type: DataType) -> Self {
        self.push_column(member, None, member, data_type, false, false)
    }

    pub fn column_in(self, member: &str, table: &str, column: &str, data_type: DataType) -> Self {
        self.push_column(member, Some(table), column, data_type, false, false)
    }

    pub fn nested<S: AsRef<str>>(mut self, member: &str, entity: S) -> Self {
        self.members.push(MemberMapping::Nested {
            member: member.to_string(),
            entity: EntityDescriptor::new(entity),
        });
        self
    }

    /// A relationship matching `target.target_keys[i] = self.source_keys[i]`.
    pub fn relationship<S: AsRef<str>>(
        mut self,
        member: &str,
        target: S,
        source_keys: &[&str],
        target_keys: &[&str],
        singleton: bool,
    ) -> Self {
        self.members.push(MemberMapping::Relationship(RelationshipMapping {
            member: member.to_string(),
            target: EntityDescriptor::new(target),
            source_keys: source_keys.iter().map(|s| s.to_string()).collect(),
            target_keys: target_keys.iter().map(|s| s.to_string()).collect(),
            singleton,
        }));
        self
    }

    fn find(&self, member: &str) -> OptResult<&MemberMapping> {
        self.members
            .iter()
            .find(|m| m.member() == member)
            .ok_or_else(|| {
                OptError::UnknownMember {
                    entity: self.descriptor.to_string(),
                    member: member.to_string(),
                }
                .into()
            })
    }

    fn key_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.members.iter().filter_map(|m| match m {
            MemberMapping::Column(c) if c.primary_key => Some(c),
            _ => None,
        })
    }
}

/// A table driven [`QueryMapping`].
#[derive(Clone, Debug, Default)]
pub struct BasicMapping {
    entities: HashMap<EntityDescriptor, EntityMapping>,
    identity_function: Option<String>,
}

impl BasicMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntityMapping) -> Self {
        self.add_entity(entity);
        self
    }

    /// Reads generated keys with `name()` instead of [`LAST_IDENTITY_FUNCTION`].
    pub fn with_identity_function<S: Into<String>>(mut self, name: S) -> Self {
        self.identity_function = Some(name.into());
        self
    }

    pub fn add_entity(&mut self, entity: EntityMapping) {
        self.entities.insert(entity.descriptor.clone(), entity);
    }

    fn entity(&self, entity: &EntityDescriptor) -> OptResult<&EntityMapping> {
        self.entities
            .get(entity)
            .ok_or_else(|| OptError::UnknownEntity(entity.to_string()).into())
    }

    /// Declares a column per column member of `mapping` (prefixed for embedded entities) and
    /// returns the field bindings referencing them through `select_alias`.
    fn entity_fields(
        &self,
        mapping: &EntityMapping,
        tables: &HashMap<String, TableAlias>,
        primary: TableAlias,
        select_alias: TableAlias,
        prefix: &str,
        columns: &mut Vec<ColumnDeclaration>,
    ) -> OptResult<Vec<FieldBinding>> {
        let mut fields = Vec::new();
        for member in &mapping.members {
            match member {
                MemberMapping::Column(c) => {
                    let table_alias = tables.get(&c.table).copied().unwrap_or(primary);
                    let name = format!("{}{}", prefix, c.member);
                    columns.push(ColumnDeclaration::new(
                        name.clone(),
                        col(table_alias, c.column.clone(), c.data_type),
                        c.data_type,
                    ));
                    let reference = col(select_alias, name, c.data_type);
                    fields.push(FieldBinding::new(c.member.clone(), reference));
                }
                MemberMapping::Nested { member, entity: nested } => {
                    let nested_mapping = self.entity(nested)?;
                    let nested_fields = self.entity_fields(
                        nested_mapping,
                        tables,
                        primary,
                        select_alias,
                        &format!("{}{}_", prefix, member),
                        columns,
                    )?;
                    fields.push(FieldBinding::new(member.clone(), entity(nested, nested_fields)));
                }
                MemberMapping::Relationship(_) => {}
            }
        }
        Ok(fields)
    }
}

impl QueryMapping for BasicMapping {
    fn member_kind(&self, entity: &EntityDescriptor, member: &str) -> OptResult<MemberKind> {
        Ok(match self.entity(entity)?.find(member)? {
            MemberMapping::Column(c) => MemberKind::Column {
                data_type: c.data_type,
            },
            MemberMapping::Nested { entity, .. } => MemberKind::Nested {
                entity: entity.clone(),
            },
            MemberMapping::Relationship(r) => MemberKind::Relationship {
                target: r.target.clone(),
                singleton: r.singleton,
            },
        })
    }

    fn members(&self, entity: &EntityDescriptor) -> OptResult<Vec<String>> {
        Ok(self
            .entity(entity)?
            .members
            .iter()
            .map(|m| m.member().to_string())
            .collect())
    }

    fn entity_query(
        &self,
        entity_descriptor: &EntityDescriptor,
    ) -> OptResult<ClientProjectionExpr> {
        let mapping = self.entity(entity_descriptor)?;
        let ordered = dependency_order(self, entity_descriptor)?;

        let mut tables: HashMap<String, TableAlias> = HashMap::new();
        let mut from: Option<ExprRef> = None;
        for table in &ordered {
            let table_expr = entity_table(entity_descriptor, table.name.clone());
            let alias = table_expr.declared_alias().ok_or_else(|| {
                OptError::Unsupported(format!("table {} has no alias", table.name))
            })?;
            from = Some(match from {
                None => table_expr,
                Some(left) => {
                    let related = table.depends_on.first().and_then(|d| tables.get(d));
                    let related = related.ok_or_else(|| OptError::InconsistentMapping {
                        entity: entity_descriptor.to_string(),
                        reason: format!(
                            "table {} is not related to the primary table",
                            table.name
                        ),
                    })?;
                    let condition = conjunction(mapping.key_columns().map(|k| {
                        eq(
                            col(alias, k.column.clone(), k.data_type),
                            col(*related, k.column.clone(), k.data_type),
                        )
                    }));
                    join(JoinType::LeftOuter, left, table_expr, condition)
                }
            });
            tables.insert(table.name.clone(), alias);
        }
        let from = from.ok_or_else(|| OptError::InconsistentMapping {
            entity: entity_descriptor.to_string(),
            reason: "no tables".to_string(),
        })?;
        let primary = tables
            .get(mapping.primary_table())
            .copied()
            .ok_or_else(|| OptError::InconsistentMapping {
                entity: entity_descriptor.to_string(),
                reason: "primary table is not first in dependency order".to_string(),
            })?;

        let select_alias = TableAlias::new();
        let mut columns = Vec::new();
        let fields = self.entity_fields(mapping, &tables, primary, select_alias, "", &mut columns)?;
        let select = SelectExpr::new(select_alias, columns, from);
        Ok(ClientProjectionExpr::new(
            select,
            entity(entity_descriptor, fields),
            Aggregator::List,
        ))
    }

    fn relationship_projection(
        &self,
        source: &EntityExpr,
        member: &str,
    ) -> OptResult<RelationshipProjection> {
        let relationship = match self.entity(&source.entity)?.find(member)? {
            MemberMapping::Relationship(r) => r.clone(),
            _ => {
                return Err(OptError::Unsupported(format!(
                    "{}.{} is not a relationship",
                    source.entity, member
                ))
                .into())
            }
        };
        if relationship.source_keys.len() != relationship.target_keys.len() {
            return Err(OptError::InconsistentMapping {
                entity: source.entity.to_string(),
                reason: format!("relationship {} has unbalanced keys", member),
            }
            .into());
        }

        let target = self.entity_query(&relationship.target)?;
        let select = target
            .select()
            .cloned()
            .ok_or_else(|| OptError::Unsupported("entity query without select".to_string()))?;
        let mut predicates = Vec::new();
        let keys = relationship.source_keys.iter().zip(&relationship.target_keys);
        for (source_key, target_key) in keys {
            let outer = source.field(source_key).ok_or_else(|| OptError::UnknownMember {
                entity: source.entity.to_string(),
                member: source_key.clone(),
            })?;
            let inner = select.column(target_key).ok_or_else(|| OptError::UnknownMember {
                entity: relationship.target.to_string(),
                member: target_key.clone(),
            })?;
            predicates.push(eq(inner.expr.clone(), outer.clone()));
        }
        let filter = conjunction(select.filter.clone().into_iter().chain(predicates));
        let aggregator = if relationship.singleton {
            Aggregator::FirstOrDefault
        } else {
            Aggregator::List
        };
        let projection =
            ClientProjectionExpr::new(select.with_filter(filter), target.projector, aggregator)
                .with_origin(Some(RelationshipOrigin {
                    entity: source.entity.clone(),
                    member: member.to_string(),
                }));
        Ok(RelationshipProjection {
            projection,
            source_keys: relationship.source_keys,
            target_keys: relationship.target_keys,
        })
    }

    fn tables(&self, entity: &EntityDescriptor) -> OptResult<Vec<TableMapping>> {
        Ok(self.entity(entity)?.tables.clone())
    }

    fn columns(&self, entity: &EntityDescriptor) -> OptResult<Vec<ColumnMapping>> {
        Ok(self
            .entity(entity)?
            .members
            .iter()
            .filter_map(|m| match m {
                MemberMapping::Column(c) => Some(c.clone()),
                _ => None,
            })
            .collect())
    }

    fn generated_key(&self, _table: &TableMapping, key: &ColumnMapping) -> ExprRef {
        let name = self.identity_function.as_deref().unwrap_or(LAST_IDENTITY_FUNCTION);
        function(name, vec![], key.data_type)
    }
}

/// Included and deferred relationships as explicit sets.
#[derive(Clone, Debug, Default)]
pub struct BasicPolicy {
    included: HashSet<(EntityDescriptor, String)>,
    deferred: HashSet<(EntityDescriptor, String)>,
}

impl BasicPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<S: AsRef<str>>(mut self, entity: S, member: &str) -> Self {
        self.included
            .insert((EntityDescriptor::new(entity), member.to_string()));
        self
    }

    pub fn defer<S: AsRef<str>>(mut self, entity: S, member: &str) -> Self {
        self.deferred
            .insert((EntityDescriptor::new(entity), member.to_string()));
        self
    }
}

impl QueryPolicy for BasicPolicy {
    fn is_included(&self, entity: &EntityDescriptor, member: &str) -> bool {
        self.included.contains(&(entity.clone(), member.to_string()))
    }

    fn is_deferred_loaded(&self, entity: &EntityDescriptor, member: &str) -> bool {
        self.deferred.contains(&(entity.clone(), member.to_string()))
    }
}
