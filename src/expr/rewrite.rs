use std::rc::Rc;

use crate::error::OptResult;
use crate::expr::ExprRef;

/// A tree-to-tree rewrite.
///
/// Implementors override [`ExprRewriter::rewrite`], match on the node kinds they care about and
/// fall back to [`rewrite_children`] for everything else. Nodes whose children come back
/// unchanged are returned as-is, so untouched subtrees stay shared with the input.
pub trait ExprRewriter {
    fn rewrite(&mut self, expr: &ExprRef) -> ExprRef {
        rewrite_children(self, expr)
    }
}

/// Rewrites every child of `expr` with `rewriter`, rebuilding `expr` only if a child changed.
pub fn rewrite_children<R: ExprRewriter + ?Sized>(rewriter: &mut R, expr: &ExprRef) -> ExprRef {
    match expr.map_children(&mut |child| rewriter.rewrite(child)) {
        Some(new) => Rc::new(new),
        None => expr.clone(),
    }
}

/// Bottom-up rewrite: `f` sees each node after its children were rewritten and returns a
/// replacement, or `None` to keep the node.
pub fn transform_up<F>(expr: &ExprRef, f: &mut F) -> ExprRef
where
    F: FnMut(&ExprRef) -> Option<ExprRef>,
{
    let expr = match expr.map_children(&mut |child| transform_up(child, f)) {
        Some(new) => Rc::new(new),
        None => expr.clone(),
    };
    f(&expr).unwrap_or(expr)
}

/// [`transform_up`] for fallible rewrites. Stops at the first error.
pub fn try_transform_up<F>(expr: &ExprRef, f: &mut F) -> OptResult<ExprRef>
where
    F: FnMut(&ExprRef) -> OptResult<Option<ExprRef>>,
{
    let mut error = None;
    let mapped = expr.map_children(&mut |child| {
        if error.is_some() {
            return child.clone();
        }
        match try_transform_up(child, f) {
            Ok(new) => new,
            Err(e) => {
                error = Some(e);
                child.clone()
            }
        }
    });
    if let Some(e) = error {
        return Err(e);
    }
    let expr = mapped.map(Rc::new).unwrap_or_else(|| expr.clone());
    Ok(f(&expr)?.unwrap_or(expr))
}
