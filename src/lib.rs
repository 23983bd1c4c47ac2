//! ## Background
//!
//! An object-relational query pipeline translates a query over mapped entities into relational
//! expression trees, and finally into SQL. The trees it produces first are correct but naive: every
//! member access is a nested query, every layer of the source query is a nested select, and every
//! related collection is a query executed once per row of its owner. This crate rewrites such
//! trees into equivalent trees that are cheaper to execute and simpler to render.
//!
//! Optimization here is rule based. We apply a collection of rewrite rules to a query tree in a
//! fixed order, some of them repeatedly until a fix point (tree no longer changes) or a number of
//! rounds. Every rule is a substitution rule: it returns a tree computing the same rows, and in
//! general the new tree should be better than the original one. Examples are removing columns
//! nobody reads, merging a select into the select it reads from, or joining a single related row
//! into its owner's query instead of fetching it separately.
//!
//! ## Design
//!
//! ### Expression trees
//!
//! Trees are immutable and shared by reference counting ([`expr::ExprRef`]); a rewrite rebuilds
//! the path from the root to what changed and shares everything else. Sources are named by
//! [`expr::TableAlias`], whose identity is allocation based: two aliases are the same only if
//! they were created together, never because they print the same. Column references carry the
//! alias of the source they read, so moving a subtree under another select requires remapping the
//! aliases it references; [`scope`] tracks which aliases are visible where and validates trees.
//!
//! ### Heuristic Optimizer
//!
//! The [`heuristic`] pipeline runs relationship binding first, then the simplification batch, then
//! the conversions of nested projections into joins, re-simplifying after each, and finally the
//! rewrites that depend on the target dialect. Callers may compose other sequences of stages.
//!
//! ### Mapping
//!
//! The optimizer never learns about entities itself. It asks a [`mapping::QueryMapping`] for the
//! query behind an entity or a relationship and a [`mapping::QueryPolicy`] whether relationships
//! are loaded eagerly. [`mapping::BasicMapping`] answers from programmatic declarations.

pub mod analysis;
pub mod error;
pub mod expr;
pub mod heuristic;
pub mod mapping;
pub mod optimizer;
pub mod rewrite;
pub mod rules;
pub mod scope;
