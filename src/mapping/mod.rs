//! Collaborators describing how entities map onto tables, and which relationships to load.
//!
//! The optimizer only asks narrow questions: what kind of member is this, what query produces
//! the rows of an entity or of a relationship, in which order are the tables of an entity written.
//! [`BasicMapping`] and [`BasicPolicy`] answer them from programmatic declarations.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{OptError, OptResult};
use crate::expr::{function, ClientProjectionExpr, DataType, EntityDescriptor, EntityExpr, ExprRef};

mod basic;
pub use basic::*;
mod commands;
pub use commands::*;

/// Function reading the key value the database generated for the last insert in the current
/// scope. Used for generated keys unless the mapping names another one.
pub const LAST_IDENTITY_FUNCTION: &str = "SCOPE_IDENTITY";

/// What a member of an entity is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Column { data_type: DataType },
    /// An embedded entity stored in the owner's tables.
    Nested { entity: EntityDescriptor },
    Relationship {
        target: EntityDescriptor,
        singleton: bool,
    },
}

/// One table of a (possibly multi-table) entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableMapping {
    pub name: String,
    /// Tables that must be written before this one, by name. Empty for the primary table.
    pub depends_on: Vec<String>,
}

/// A column member of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMapping {
    pub member: String,
    pub table: String,
    pub column: String,
    pub data_type: DataType,
    pub primary_key: bool,
    /// Value assigned by the database on insert.
    pub generated: bool,
}

/// The correlated query for the rows related through one relationship member.
#[derive(Clone, Debug)]
pub struct RelationshipProjection {
    /// Its select filters on `target_keys[i] = source.source_keys[i]`, with the source side
    /// taken from the entity expression the relationship was requested for.
    pub projection: ClientProjectionExpr,
    pub source_keys: Vec<String>,
    pub target_keys: Vec<String>,
}

pub trait QueryMapping {
    fn member_kind(&self, entity: &EntityDescriptor, member: &str) -> OptResult<MemberKind>;

    /// Mapped members in declaration order.
    fn members(&self, entity: &EntityDescriptor) -> OptResult<Vec<String>>;

    /// All rows of `entity`, projected into an entity expression.
    fn entity_query(&self, entity: &EntityDescriptor) -> OptResult<ClientProjectionExpr>;

    /// Rows related to `source` through `member`, correlated to the expressions of `source`.
    fn relationship_projection(
        &self,
        source: &EntityExpr,
        member: &str,
    ) -> OptResult<RelationshipProjection>;

    fn tables(&self, entity: &EntityDescriptor) -> OptResult<Vec<TableMapping>>;

    fn columns(&self, entity: &EntityDescriptor) -> OptResult<Vec<ColumnMapping>>;

    /// The value generated for `key` by the insert into `table` just before.
    fn generated_key(&self, _table: &TableMapping, key: &ColumnMapping) -> ExprRef {
        function(LAST_IDENTITY_FUNCTION, vec![], key.data_type)
    }
}

pub trait QueryPolicy {
    /// Whether the relationship is loaded eagerly with its owner.
    fn is_included(&self, entity: &EntityDescriptor, member: &str) -> bool;

    /// Whether the relationship is fetched on demand, which forbids joining it into the owner's
    /// query.
    fn is_deferred_loaded(&self, entity: &EntityDescriptor, member: &str) -> bool;
}

/// Tables of `entity` ordered so that every table comes after the tables it depends on.
pub fn dependency_order(
    mapping: &dyn QueryMapping,
    entity: &EntityDescriptor,
) -> OptResult<Vec<TableMapping>> {
    let tables = mapping.tables(entity)?;
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: HashMap<&str, NodeIndex> = tables
        .iter()
        .enumerate()
        .map(|(idx, t)| (t.name.as_str(), graph.add_node(idx)))
        .collect();

    for table in &tables {
        let node = nodes[table.name.as_str()];
        for dependency in &table.depends_on {
            let dependency_node = nodes.get(dependency.as_str()).ok_or_else(|| {
                OptError::InconsistentMapping {
                    entity: entity.to_string(),
                    reason: format!("table {} depends on unknown table {}", table.name, dependency),
                }
            })?;
            graph.add_edge(*dependency_node, node, ());
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| OptError::InconsistentMapping {
        entity: entity.to_string(),
        reason: format!(
            "cyclic table dependency involving {}",
            tables[graph[cycle.node_id()]].name
        ),
    })?;
    Ok(sorted.into_iter().map(|n| tables[graph[n]].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_order() {
        let mapping = BasicMapping::new().with_entity(
            EntityMapping::new("Person", "People")
                .dependent_table("Addresses", &["Employees"])
                .dependent_table("Employees", &["People"])
                .key("id", DataType::Int64),
        );
        let order = dependency_order(&mapping, &EntityDescriptor::new("Person")).unwrap();
        let names: Vec<_> = order.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["People", "Employees", "Addresses"]);
    }

    #[test]
    fn test_cyclic_dependency_is_inconsistent() {
        let mapping = BasicMapping::new().with_entity(
            EntityMapping::new("Person", "People")
                .dependent_table("A", &["B"])
                .dependent_table("B", &["A"])
                .key("id", DataType::Int64),
        );
        let err = dependency_order(&mapping, &EntityDescriptor::new("Person")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::InconsistentMapping { .. })
        ));
    }
}
