//! Rewrite rules.
//!
//! Every rule is a total function from a query tree to a query tree: a rule whose precondition
//! does not hold somewhere simply leaves that part of the tree unchanged. Rules only fail when a
//! collaborator they consult fails.

use enum_dispatch::enum_dispatch;
use strum_macros::AsRefStr;

use crate::error::OptResult;
use crate::expr::ExprRef;
use crate::optimizer::OptimizerContext;

mod client_join;
pub use client_join::*;
mod cross_join;
pub use cross_join::*;
mod order_by;
pub use order_by::*;
mod redundant_columns;
pub use redundant_columns::*;
mod redundant_join;
pub use redundant_join::*;
mod redundant_subquery;
pub use redundant_subquery::*;
mod relationship;
pub use relationship::*;
mod singleton_projection;
pub use singleton_projection::*;
mod skip_take;
pub use skip_take::*;
mod subquery_merger;
pub use subquery_merger::*;
mod unused_columns;
pub use unused_columns::*;

#[enum_dispatch]
pub trait Rule {
    fn name(&self) -> &'static str;

    /// Rewrites `expr`, returning it unchanged (ideally the same pointer) when nothing applies.
    fn apply(&self, expr: &ExprRef, context: &OptimizerContext) -> OptResult<ExprRef>;
}

#[enum_dispatch(Rule)]
#[derive(Clone, Debug, AsRefStr)]
pub enum RuleImpl {
    IncludeRelationships(IncludeRelationships),
    BindRelationships(BindRelationships),
    RemoveUnusedColumns(RemoveUnusedColumns),
    RemoveRedundantColumns(RemoveRedundantColumns),
    RemoveRedundantSubqueries(RemoveRedundantSubqueries),
    MergeSubqueries(MergeSubqueries),
    RemoveRedundantJoins(RemoveRedundantJoins),
    PromoteCrossJoins(PromoteCrossJoins),
    HoistOrderBy(HoistOrderBy),
    RewriteSkipTake(RewriteSkipTake),
    ConvertSingletonProjections(ConvertSingletonProjections),
    ConvertClientJoins(ConvertClientJoins),
}

/// The simplification batch, in the order it runs within one round.
pub fn simplify_rules() -> Vec<RuleImpl> {
    vec![
        RemoveUnusedColumns.into(),
        RemoveRedundantColumns.into(),
        RemoveRedundantSubqueries.into(),
        MergeSubqueries.into(),
        RemoveRedundantJoins.into(),
    ]
}

#[cfg(test)]
pub(crate) fn empty_context() -> OptimizerContext {
    use std::rc::Rc;

    use crate::mapping::{BasicMapping, BasicPolicy};

    OptimizerContext::new(Rc::new(BasicMapping::new()), Rc::new(BasicPolicy::new()))
}

/// Customers with an embedded address and a collection of orders; every order has one customer.
#[cfg(test)]
pub(crate) fn sample_mapping() -> crate::mapping::BasicMapping {
    use crate::expr::DataType;
    use crate::mapping::{BasicMapping, EntityMapping};

    BasicMapping::new()
        .with_entity(
            EntityMapping::new("Customer", "Customers")
                .key("id", DataType::Int64)
                .column("name", DataType::String)
                .nested("address", "Address")
                .relationship("orders", "Order", &["id"], &["customer_id"], false),
        )
        .with_entity(
            EntityMapping::new("Address", "Customers")
                .column("city", DataType::String)
                .column("zip", DataType::String),
        )
        .with_entity(
            EntityMapping::new("Order", "Orders")
                .key("id", DataType::Int64)
                .column("customer_id", DataType::Int64)
                .column("total", DataType::Int64)
                .relationship("customer", "Customer", &["customer_id"], &["id"], true),
        )
}

#[cfg(test)]
pub(crate) fn sample_context(policy: crate::mapping::BasicPolicy) -> OptimizerContext {
    OptimizerContext::new(std::rc::Rc::new(sample_mapping()), std::rc::Rc::new(policy))
}
