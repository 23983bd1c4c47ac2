use strum_macros::{AsRefStr, Display};

use crate::expr::{DataType, EntityDescriptor, ExprRef, TableAlias};

/// A physical table reference. Declares `alias`.
#[derive(Clone, Debug, PartialEq)]
pub struct TableExpr {
    pub alias: TableAlias,
    pub entity: Option<EntityDescriptor>,
    pub name: String,
}

impl TableExpr {
    pub fn new<S: Into<String>>(
        alias: TableAlias,
        entity: Option<EntityDescriptor>,
        name: S,
    ) -> Self {
        Self {
            alias,
            entity,
            name: name.into(),
        }
    }
}

/// One output column of a select. Names are unique within a select.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDeclaration {
    pub name: String,
    pub expr: ExprRef,
    pub data_type: DataType,
}

impl ColumnDeclaration {
    pub fn new<S: Into<String>>(name: S, expr: ExprRef, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            expr,
            data_type,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    #[strum(to_string = "ASC")]
    Ascending,
    #[strum(to_string = "DESC")]
    Descending,
}

impl OrderDirection {
    pub fn reversed(self) -> Self {
        match self {
            OrderDirection::Ascending => OrderDirection::Descending,
            OrderDirection::Descending => OrderDirection::Ascending,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderExpr {
    pub direction: OrderDirection,
    pub expr: ExprRef,
}

impl OrderExpr {
    pub fn new(direction: OrderDirection, expr: ExprRef) -> Self {
        Self { direction, expr }
    }

    pub fn reversed(&self) -> Self {
        Self {
            direction: self.direction.reversed(),
            expr: self.expr.clone(),
        }
    }
}

/// A select declares `alias`; its columns are the only surface through which anything above may
/// observe `from`.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectExpr {
    pub alias: TableAlias,
    pub columns: Vec<ColumnDeclaration>,
    pub from: ExprRef,
    pub filter: Option<ExprRef>,
    pub order_by: Vec<OrderExpr>,
    pub group_by: Vec<ExprRef>,
    pub skip: Option<ExprRef>,
    pub take: Option<ExprRef>,
    pub distinct: bool,
    pub reverse: bool,
}

impl SelectExpr {
    pub fn new(alias: TableAlias, columns: Vec<ColumnDeclaration>, from: ExprRef) -> Self {
        Self {
            alias,
            columns,
            from,
            filter: None,
            order_by: vec![],
            group_by: vec![],
            skip: None,
            take: None,
            distinct: false,
            reverse: false,
        }
    }

    pub fn with_alias(mut self, alias: TableAlias) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDeclaration>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_from(mut self, from: ExprRef) -> Self {
        self.from = from;
        self
    }

    pub fn with_filter(mut self, filter: Option<ExprRef>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderExpr>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_group_by(mut self, group_by: Vec<ExprRef>) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn with_skip(mut self, skip: Option<ExprRef>) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_take(mut self, take: Option<ExprRef>) -> Self {
        self.take = take;
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDeclaration> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }
}

#[derive(Clone, Copy, Debug, Display, AsRefStr, PartialEq, Eq, Hash)]
pub enum JoinType {
    #[strum(to_string = "CROSS JOIN")]
    Cross,
    #[strum(to_string = "INNER JOIN")]
    Inner,
    #[strum(to_string = "LEFT OUTER JOIN")]
    LeftOuter,
    /// Left outer join known to match at most one right row per left row.
    #[strum(to_string = "SINGLETON LEFT OUTER JOIN")]
    SingletonLeftOuter,
    #[strum(to_string = "CROSS APPLY")]
    CrossApply,
    #[strum(to_string = "OUTER APPLY")]
    OuterApply,
}

impl JoinType {
    /// Apply joins evaluate the right side once per left row, so the right side may reference
    /// aliases declared on the left.
    pub fn is_apply(&self) -> bool {
        matches!(self, JoinType::CrossApply | JoinType::OuterApply)
    }
}

/// Joins declare no alias of their own: everything above sees the aliases of both sides.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinExpr {
    pub join_type: JoinType,
    pub left: ExprRef,
    pub right: ExprRef,
    pub condition: Option<ExprRef>,
}

impl JoinExpr {
    pub fn new(
        join_type: JoinType,
        left: ExprRef,
        right: ExprRef,
        condition: Option<ExprRef>,
    ) -> Self {
        Self {
            join_type,
            left,
            right,
            condition,
        }
    }
}
