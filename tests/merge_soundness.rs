mod common;

use common::*;
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use relational_optimizer::expr::*;
use relational_optimizer::rewrite::select_ref;
use relational_optimizer::rules::{can_merge_with_from, left_most_select, merge_subqueries};
use relational_optimizer::scope::has_valid_references;

#[derive(Clone, Debug)]
struct InnerShape {
    filter: Option<i64>,
    /// `Some(true)` orders descending.
    order: Option<bool>,
    take: Option<i64>,
    skip: Option<i64>,
    distinct: bool,
    grouped: bool,
}

#[derive(Clone, Debug)]
struct OuterShape {
    filter: Option<i64>,
    /// `Some(true)` restates the inner ordering, `Some(false)` orders by `a`.
    order: Option<bool>,
    take: Option<i64>,
    skip: Option<i64>,
    distinct: bool,
    count: bool,
    /// Groups by `a`; with `count` the group size is projected too.
    grouped: bool,
    /// Reads `x join U on x.a = U.a` and projects `U.c`.
    joined: bool,
}

fn inner_shape() -> impl Strategy<Value = InnerShape> {
    (
        option::of(0i64..4),
        option::of(any::<bool>()),
        option::of(0i64..5),
        option::of(0i64..3),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(filter, order, take, skip, distinct, grouped)| InnerShape {
            filter,
            order,
            take,
            skip,
            distinct,
            grouped,
        })
}

fn outer_shape() -> impl Strategy<Value = OuterShape> {
    (
        option::of(0i64..4),
        option::of(any::<bool>()),
        option::of(0i64..5),
        option::of(0i64..3),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(filter, order, take, skip, distinct, count, grouped, joined)| OuterShape {
                filter,
                order,
                take,
                skip,
                distinct,
                count,
                grouped,
                joined,
            },
        )
}

fn direction(descending: bool) -> OrderDirection {
    if descending {
        OrderDirection::Descending
    } else {
        OrderDirection::Ascending
    }
}

/// `select .. from (select .. from T) x [join U]` shaped by `inner` and `outer`.
fn nested_select(inner: &InnerShape, outer: &OuterShape) -> ExprRef {
    let t = table("T");
    let ta = t.declared_alias().unwrap();
    let int = |alias: TableAlias, name: &str| col(alias, name, DataType::Int64);

    let names: &[&str] = if inner.grouped { &["a"] } else { &["a", "b"] };
    let order_key = names[names.len() - 1];

    let mut builder = SelectBuilder::new(t);
    for name in names {
        builder = builder.column(*name, int(ta, name));
    }
    if inner.grouped {
        builder = builder.group_by(int(ta, "a"));
    }
    if let Some(k) = inner.filter {
        builder = builder.filter(binary(BinaryOp::Gt, int(ta, "a"), lit(k)));
    }
    if let Some(descending) = inner.order {
        builder = builder.order_by(direction(descending), int(ta, order_key));
    }
    if let Some(skip) = inner.skip {
        builder = builder.skip(lit(skip));
    }
    if let Some(take) = inner.take {
        builder = builder.take(lit(take));
    }
    if inner.distinct {
        builder = builder.distinct();
    }
    let from = builder.build();
    let xa = from.alias;

    let u = table("U");
    let ua = u.declared_alias().unwrap();
    let source = if outer.joined {
        let condition = eq(int(xa, "a"), int(ua, "a"));
        join(JoinType::Inner, select_ref(from), u, Some(condition))
    } else {
        select_ref(from)
    };

    let mut builder = SelectBuilder::new(source);
    if outer.grouped {
        builder = builder.column("a", int(xa, "a")).group_by(int(xa, "a"));
        if outer.count {
            builder = builder.column("n", count_star());
        }
    } else if outer.count {
        builder = builder.column("n", count_star());
    } else {
        for name in names {
            builder = builder.column(*name, int(xa, name));
        }
        if outer.joined {
            builder = builder.column("c", int(ua, "c"));
        }
    }
    if let Some(k) = outer.filter {
        builder = builder.filter(binary(BinaryOp::Lt, int(xa, order_key), lit(k)));
    }
    // A grouped select can only order by its grouping key.
    match (outer.order, inner.order) {
        (Some(true), Some(descending)) if !outer.grouped => {
            builder = builder.order_by(direction(descending), int(xa, order_key));
        }
        (Some(_), _) => builder = builder.order_by(OrderDirection::Ascending, int(xa, "a")),
        (None, _) => {}
    }
    if let Some(skip) = outer.skip {
        builder = builder.skip(lit(skip));
    }
    if let Some(take) = outer.take {
        builder = builder.take(lit(take));
    }
    if outer.distinct {
        builder = builder.distinct();
    }
    builder.build_ref()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn merged_select_returns_same_rows(
        rows in vec((0i64..4, 0i64..4), 0..8),
        u_rows in vec((0i64..4, 0i64..4), 0..4),
        inner in inner_shape(),
        outer in outer_shape(),
    ) {
        let pairs = |rows: &[(i64, i64)]| -> Vec<Vec<Value>> {
            rows.iter().map(|(x, y)| vec![Value::Int(*x), Value::Int(*y)]).collect()
        };
        let db = Database::new()
            .with_table("T", &["a", "b"], pairs(&rows))
            .with_table("U", &["a", "c"], pairs(&u_rows));
        let query = nested_select(&inner, &outer);
        let select = query.as_select().unwrap();
        let from = select.from.as_select().unwrap();
        if !can_merge_with_from(select, from, true) {
            return Ok(());
        }

        let merged = merge_subqueries(&query);
        prop_assert!(left_most_select(&merged.as_select().unwrap().from).is_none());
        prop_assert!(has_valid_references(&merged, None));
        let evaluator = Evaluator::new(&db);
        prop_assert_eq!(evaluator.evaluate(&merged), evaluator.evaluate(&query));
    }
}
