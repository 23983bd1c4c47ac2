use std::collections::HashSet;

use crate::analysis::can_join_on_server;
use crate::error::{OptError, OptResult};
use crate::expr::*;
use crate::mapping::{MemberKind, QueryMapping, QueryPolicy};
use crate::optimizer::OptimizerContext;
use crate::rewrite::{add_outer_join_test, add_redundant_select, project_columns, select_ref};
use crate::rules::Rule;

/// Adds a member access to every entity projector for each relationship the policy includes.
#[derive(Clone, Copy, Debug, Default)]
pub struct IncludeRelationships;

impl Rule for IncludeRelationships {
    fn name(&self) -> &'static str {
        "include_relationships"
    }

    fn apply(&self, expr: &ExprRef, context: &OptimizerContext) -> OptResult<ExprRef> {
        include_members(expr, context.mapping(), context.policy(), &[])
    }
}

/// Resolves member accesses on entities into columns, flattened singleton joins, or nested
/// client projections.
#[derive(Clone, Copy, Debug, Default)]
pub struct BindRelationships;

impl Rule for BindRelationships {
    fn name(&self) -> &'static str {
        "bind_relationships"
    }

    fn apply(&self, expr: &ExprRef, context: &OptimizerContext) -> OptResult<ExprRef> {
        RelationshipBinder {
            mapping: context.mapping(),
            policy: context.policy(),
            path: vec![],
        }
        .bind(expr)
    }
}

/// Relationships being expanded, outermost first. A relationship already on the path is not
/// included again, which cuts cycles such as `order.customer.orders.customer`.
pub type RelationshipPath = [(EntityDescriptor, String)];

pub fn include_members(
    expr: &ExprRef,
    mapping: &dyn QueryMapping,
    policy: &dyn QueryPolicy,
    path: &RelationshipPath,
) -> OptResult<ExprRef> {
    try_transform_up(expr, &mut |e| match &**e {
        Expr::Entity(entity) => include_in_entity(e, entity, mapping, policy, path),
        _ => Ok(None),
    })
}

fn include_in_entity(
    node: &ExprRef,
    entity: &EntityExpr,
    mapping: &dyn QueryMapping,
    policy: &dyn QueryPolicy,
    path: &RelationshipPath,
) -> OptResult<Option<ExprRef>> {
    let mut fields = entity.fields.clone();
    for name in mapping.members(&entity.entity)? {
        if entity.field(&name).is_some() || !policy.is_included(&entity.entity, &name) {
            continue;
        }
        if path.iter().any(|(e, m)| *e == entity.entity && *m == name) {
            continue;
        }
        if let MemberKind::Relationship { .. } = mapping.member_kind(&entity.entity, &name)? {
            log::trace!("including {}.{}", entity.entity, name);
            fields.push(FieldBinding::new(name.clone(), member(node.clone(), name)));
        }
    }
    if fields.len() == entity.fields.len() {
        return Ok(None);
    }
    Ok(Some(self::entity(&entity.entity, fields)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    /// Inside a clause of the select, where the sources of its `from` are visible.
    Clause,
    /// Inside the projector, where only the columns of the select are visible.
    Projector,
}

struct RelationshipBinder<'a> {
    mapping: &'a dyn QueryMapping,
    policy: &'a dyn QueryPolicy,
    path: Vec<(EntityDescriptor, String)>,
}

impl<'a> RelationshipBinder<'a> {
    fn try_map_children<F>(&mut self, expr: &ExprRef, mut f: F) -> OptResult<ExprRef>
    where
        F: FnMut(&mut Self, &ExprRef) -> OptResult<ExprRef>,
    {
        let mut error = None;
        let mapped = expr.map_children(&mut |child| {
            if error.is_some() {
                return child.clone();
            }
            match f(self, child) {
                Ok(new) => new,
                Err(e) => {
                    error = Some(e);
                    child.clone()
                }
            }
        });
        match error {
            Some(e) => Err(e),
            None => Ok(mapped.map(Expr::into_ref).unwrap_or_else(|| expr.clone())),
        }
    }

    fn bind(&mut self, expr: &ExprRef) -> OptResult<ExprRef> {
        match &**expr {
            Expr::ClientProjection(p) => self.bind_projection(p),
            _ => self.try_map_children(expr, |binder, child| binder.bind(child)),
        }
    }

    fn bind_projection(&mut self, projection: &ClientProjectionExpr) -> OptResult<ExprRef> {
        let mut select = projection.select().cloned().ok_or_else(|| {
            OptError::Unsupported("client projection over a non-select".to_string())
        })?;
        self.bind_clauses(&mut select)?;
        let projector = self.bind_projector(&projection.projector, &mut select)?;
        Ok(Expr::ClientProjection(
            ClientProjectionExpr::new(select, projector, projection.aggregator)
                .with_origin(projection.origin.clone()),
        )
        .into_ref())
    }

    fn bind_clauses(&mut self, select: &mut SelectExpr) -> OptResult<()> {
        let mut columns = Vec::with_capacity(select.columns.len());
        for column in select.columns.clone() {
            let expr = self.bind_clause(&column.expr, select)?;
            columns.push(ColumnDeclaration { expr, ..column });
        }
        let filter = match select.filter.clone() {
            Some(filter) => Some(self.bind_clause(&filter, select)?),
            None => None,
        };
        let mut order_by = Vec::with_capacity(select.order_by.len());
        for ordering in select.order_by.clone() {
            let expr = self.bind_clause(&ordering.expr, select)?;
            order_by.push(OrderExpr::new(ordering.direction, expr));
        }
        let mut group_by = Vec::with_capacity(select.group_by.len());
        for expr in select.group_by.clone() {
            group_by.push(self.bind_clause(&expr, select)?);
        }
        select.columns = columns;
        select.filter = filter;
        select.order_by = order_by;
        select.group_by = group_by;
        Ok(())
    }

    fn bind_clause(&mut self, expr: &ExprRef, select: &mut SelectExpr) -> OptResult<ExprRef> {
        match &**expr {
            Expr::Member(m) => {
                let source = self.bind_clause(&m.expr, select)?;
                self.bind_member(&source, &m.member, select, Position::Clause)
            }
            Expr::Select(_) | Expr::ClientProjection(_) => Ok(expr.clone()),
            _ => self.try_map_children(expr, |binder, child| binder.bind_clause(child, select)),
        }
    }

    fn bind_projector(&mut self, expr: &ExprRef, select: &mut SelectExpr) -> OptResult<ExprRef> {
        match &**expr {
            Expr::Member(m) => {
                let source = self.bind_projector(&m.expr, select)?;
                self.bind_member(&source, &m.member, select, Position::Projector)
            }
            Expr::ClientProjection(p) => self.bind_projection(p),
            _ => self.try_map_children(expr, |binder, child| binder.bind_projector(child, select)),
        }
    }

    fn bind_member(
        &mut self,
        source: &ExprRef,
        name: &str,
        select: &mut SelectExpr,
        position: Position,
    ) -> OptResult<ExprRef> {
        match &**source {
            Expr::Entity(e) => {
                if let Some(field) = e.field(name) {
                    return Ok(field.clone());
                }
                match self.mapping.member_kind(&e.entity, name)? {
                    MemberKind::Relationship { .. } => {
                        self.bind_relationship(e, name, select, position)
                    }
                    _ => Err(OptError::UnknownMember {
                        entity: e.entity.to_string(),
                        member: name.to_string(),
                    }
                    .into()),
                }
            }
            Expr::OuterJoined(o) => Ok(Expr::OuterJoined(OuterJoinedExpr {
                test: o.test.clone(),
                expr: self.bind_member(&o.expr, name, select, position)?,
            })
            .into_ref()),
            Expr::Record(r) => r
                .fields
                .iter()
                .find(|f| f.member == name)
                .map(|f| f.expr.clone())
                .ok_or_else(|| {
                    OptError::UnknownMember {
                        entity: "record".to_string(),
                        member: name.to_string(),
                    }
                    .into()
                }),
            _ => Err(OptError::Unsupported(format!("member {} of {}", name, source)).into()),
        }
    }

    fn bind_relationship(
        &mut self,
        source: &EntityExpr,
        name: &str,
        select: &mut SelectExpr,
        position: Position,
    ) -> OptResult<ExprRef> {
        log::trace!("binding {}.{}", source.entity, name);
        let related = self.mapping.relationship_projection(source, name)?;
        self.path.push((source.entity.clone(), name.to_string()));
        let bound = self.bind_related(related.projection);
        self.path.pop();
        let bound = bound?;

        let projection = bound.as_client_projection().ok_or_else(|| {
            OptError::Unsupported(format!("{}.{} is not a projection", source.entity, name))
        })?;
        let deferred = self.policy.is_deferred_loaded(&source.entity, name);
        if !projection.is_singleton() || deferred {
            if position == Position::Clause {
                return Err(OptError::Unsupported(format!(
                    "{}.{} cannot be used inside a query clause",
                    source.entity, name
                ))
                .into());
            }
            return Ok(bound.clone());
        }
        let nested = projection.select().ok_or_else(|| {
            OptError::Unsupported("client projection over a non-select".to_string())
        })?;

        Ok(match position {
            Position::Clause => {
                let (nested, projector) = add_outer_join_test(nested, &projection.projector);
                select.from = join(
                    JoinType::OuterApply,
                    select.from.clone(),
                    select_ref(nested),
                    None,
                );
                projector
            }
            Position::Projector => flatten_into(select, nested, &projection.projector),
        })
    }

    fn bind_related(&mut self, projection: ClientProjectionExpr) -> OptResult<ExprRef> {
        let included = include_members(
            &Expr::ClientProjection(projection).into_ref(),
            self.mapping,
            self.policy,
            &self.path,
        )?;
        self.bind(&included)
    }
}

/// Joins the singleton `nested` select into `select` and re-expresses `projector` over the
/// columns of `select`.
fn flatten_into(select: &mut SelectExpr, nested: &SelectExpr, projector: &ExprRef) -> ExprRef {
    if !can_join_on_server(select) {
        *select = add_redundant_select(select);
    }
    // Below the select, its own columns are not visible yet.
    let outer = select.clone();
    let substituted = transform_up(&select_ref(nested.clone()), &mut |e| match &**e {
        Expr::Column(c) if c.alias == outer.alias => outer.column(&c.name).map(|d| d.expr.clone()),
        _ => None,
    });
    let nested = substituted.as_select().cloned().unwrap_or_else(|| nested.clone());

    let (nested, projector) = add_outer_join_test(&nested, projector);
    let nested_alias = nested.alias;
    let from = join(JoinType::OuterApply, outer.from.clone(), select_ref(nested), None);
    let projected = project_columns(
        &projector,
        &outer.columns,
        outer.alias,
        &HashSet::from([nested_alias]),
    );
    *select = outer.with_from(from).with_columns(projected.columns);
    projected.projector
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::BasicPolicy;
    use crate::rules::{sample_context, sample_mapping};
    use crate::scope::has_valid_references;

    fn orders_query() -> ExprRef {
        let query = sample_mapping()
            .entity_query(&EntityDescriptor::new("Order"))
            .unwrap();
        Expr::ClientProjection(query).into_ref()
    }

    fn include_and_bind(policy: BasicPolicy) -> OptResult<ExprRef> {
        let context = sample_context(policy);
        let included = IncludeRelationships.apply(&orders_query(), &context)?;
        BindRelationships.apply(&included, &context)
    }

    #[test]
    fn test_include_adds_member_access() {
        let context = sample_context(BasicPolicy::new().include("Order", "customer"));
        let included = IncludeRelationships.apply(&orders_query(), &context).unwrap();
        let projector = &included.as_client_projection().unwrap().projector;
        let customer = projector.as_entity().unwrap().field("customer").unwrap();
        assert_eq!(customer.as_member().unwrap().member, "customer");
    }

    #[test]
    fn test_singleton_relationship_is_flattened() {
        let bound = include_and_bind(BasicPolicy::new().include("Order", "customer")).unwrap();
        let projection = bound.as_client_projection().unwrap();
        let select = projection.select().unwrap();
        assert_eq!(select.from.as_join().unwrap().join_type, JoinType::OuterApply);

        let customer = projection.projector.as_entity().unwrap().field("customer").unwrap();
        let joined = customer.as_outer_joined().unwrap();
        assert!(joined.expr.as_entity().is_some());
        assert!(!projection.projector.any(&mut |e| matches!(e, Expr::Member(_))));
        assert!(has_valid_references(&bound, None));
    }

    #[test]
    fn test_collection_stays_nested() {
        let context = sample_context(BasicPolicy::new().include("Customer", "orders"));
        let customers = Expr::ClientProjection(
            sample_mapping()
                .entity_query(&EntityDescriptor::new("Customer"))
                .unwrap(),
        )
        .into_ref();
        let included = IncludeRelationships.apply(&customers, &context).unwrap();
        let bound = BindRelationships.apply(&included, &context).unwrap();

        let projection = bound.as_client_projection().unwrap();
        let orders = projection.projector.as_entity().unwrap().field("orders").unwrap();
        let nested = orders.as_client_projection().unwrap();
        assert_eq!(nested.aggregator, Aggregator::List);
        assert_eq!(nested.origin.as_ref().unwrap().member, "orders");
        assert!(has_valid_references(&bound, None));
    }

    #[test]
    fn test_cycles_are_cut() {
        let policy = BasicPolicy::new()
            .include("Order", "customer")
            .include("Customer", "orders");
        let bound = include_and_bind(policy).unwrap();
        let projection = bound.as_client_projection().unwrap();
        let customer = projection.projector.as_entity().unwrap().field("customer").unwrap();
        let customer = customer.as_outer_joined().unwrap().expr.as_entity().unwrap();
        let orders = customer.field("orders").unwrap().as_client_projection().unwrap();
        // The orders of the customer do not load their customer again.
        assert!(orders.projector.as_entity().unwrap().field("customer").is_none());
        assert!(has_valid_references(&bound, None));
    }

    #[test]
    fn test_deferred_singleton_stays_nested() {
        let policy = BasicPolicy::new()
            .include("Order", "customer")
            .defer("Order", "customer");
        let bound = include_and_bind(policy).unwrap();
        let projection = bound.as_client_projection().unwrap();
        let customer = projection.projector.as_entity().unwrap().field("customer").unwrap();
        assert_eq!(
            customer.as_client_projection().unwrap().aggregator,
            Aggregator::FirstOrDefault
        );
    }

    #[test]
    fn test_member_in_filter_joins_into_from() {
        let context = sample_context(BasicPolicy::new());
        let query = sample_mapping()
            .entity_query(&EntityDescriptor::new("Order"))
            .unwrap();
        let select = query.select().unwrap().clone();
        // The entity as seen from inside the select, over its source columns.
        let fields = select
            .columns
            .iter()
            .map(|c| FieldBinding::new(c.name.clone(), c.expr.clone()))
            .collect();
        let order = entity(&EntityDescriptor::new("Order"), fields);
        let predicate = eq(
            member(member(order, "customer"), "name"),
            lit("alice"),
        );
        let select = select.clone().with_filter(Some(predicate));
        let query = Expr::ClientProjection(ClientProjectionExpr::new(
            select,
            query.projector.clone(),
            Aggregator::List,
        ))
        .into_ref();

        let bound = BindRelationships.apply(&query, &context).unwrap();
        let select = bound.as_client_projection().unwrap().select().unwrap();
        assert_eq!(select.from.as_join().unwrap().join_type, JoinType::OuterApply);
        let filter = select.filter.as_ref().unwrap().as_binary().unwrap();
        assert!(filter.left.as_outer_joined().is_some());
        assert!(has_valid_references(&bound, None));
    }

    #[test]
    fn test_unknown_member_fails() {
        let context = sample_context(BasicPolicy::new());
        let query = sample_mapping()
            .entity_query(&EntityDescriptor::new("Order"))
            .unwrap();
        let projector = member(query.projector.clone(), "nope");
        let query = Expr::ClientProjection(ClientProjectionExpr::new(
            query.select().unwrap().clone(),
            projector,
            Aggregator::List,
        ))
        .into_ref();
        let err = BindRelationships.apply(&query, &context).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::UnknownMember { .. })
        ));
    }
}
