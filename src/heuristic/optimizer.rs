use std::rc::Rc;

use anyhow::ensure;

use crate::error::{OptError, OptResult};
use crate::expr::ExprRef;
use crate::optimizer::{OptimizerConfig, OptimizerContext};
use crate::rules::*;
use crate::scope::check_references;

/// One step of a [`Pipeline`].
#[derive(Clone, Debug)]
pub enum Stage {
    Once(RuleImpl),
    /// Rules run in order, round after round, until a round changes nothing.
    FixedPoint {
        name: &'static str,
        rules: Vec<RuleImpl>,
    },
}

/// An ordered list of stages.
#[derive(Clone, Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    /// Max number of rounds of a fixed-point stage.
    max_iterations: usize,
}

impl Pipeline {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            stages: vec![],
            max_iterations,
        }
    }

    /// Bind relationships, then collapse nested projections into as few server queries as
    /// possible, then shape the result for the target dialect.
    pub fn standard(config: &OptimizerConfig) -> Self {
        let pipeline = Self::new(config.max_iterations)
            .once(IncludeRelationships)
            .once(BindRelationships)
            .simplify()
            .once(ConvertSingletonProjections)
            .simplify()
            .once(ConvertClientJoins)
            .simplify()
            .once(HoistOrderBy)
            .once(PromoteCrossJoins)
            .simplify();
        if config.supports_skip {
            pipeline
        } else {
            pipeline.once(RewriteSkipTake).once(HoistOrderBy)
        }
    }

    pub fn once<R: Into<RuleImpl>>(mut self, rule: R) -> Self {
        self.stages.push(Stage::Once(rule.into()));
        self
    }

    pub fn fixed_point(mut self, name: &'static str, rules: Vec<RuleImpl>) -> Self {
        self.stages.push(Stage::FixedPoint { name, rules });
        self
    }

    pub fn simplify(self) -> Self {
        self.fixed_point("simplify", simplify_rules())
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn optimize(&self, expr: &ExprRef, context: &OptimizerContext) -> OptResult<ExprRef> {
        ensure!(
            self.max_iterations > 0,
            "Fixed-point stages need at least one iteration."
        );
        let mut expr = expr.clone();
        for stage in &self.stages {
            expr = match stage {
                Stage::Once(rule) => self.apply_rule(rule, &expr, context)?.0,
                Stage::FixedPoint { name, rules } => {
                    self.run_to_fixed_point(name, rules, expr, context)?
                }
            };
        }
        Ok(expr)
    }

    fn run_to_fixed_point(
        &self,
        name: &str,
        rules: &[RuleImpl],
        mut expr: ExprRef,
        context: &OptimizerContext,
    ) -> OptResult<ExprRef> {
        for times in 0..self.max_iterations {
            // The tree no longer changes after this round
            let mut fixed_point = true;
            for rule in rules {
                let (new_expr, changed) = self.apply_rule(rule, &expr, context)?;
                fixed_point &= !changed;
                expr = new_expr;
            }
            if fixed_point {
                log::debug!("Stage {} reached fixed point after {} rounds", name, times + 1);
                return Ok(expr);
            }
        }
        log::debug!(
            "Stage {} stopped after {} rounds without reaching fixed point",
            name,
            self.max_iterations
        );
        Ok(expr)
    }

    /// Returns the rewritten tree and whether it differs from `expr`.
    fn apply_rule(
        &self,
        rule: &RuleImpl,
        expr: &ExprRef,
        context: &OptimizerContext,
    ) -> OptResult<(ExprRef, bool)> {
        let new_expr = rule.apply(expr, context)?;
        if Rc::ptr_eq(&new_expr, expr) || *new_expr == **expr {
            log::debug!("Skipped applying rule {}", rule.name());
            return Ok((expr.clone(), false));
        }
        log::debug!("Applied rule {}", rule.name());
        log::trace!("Tree after applying rule {} is {}", rule.name(), new_expr);

        if context.config().validate_references {
            validate(rule.name(), &new_expr)?;
        }
        Ok((new_expr, true))
    }
}

fn validate(rule: &str, expr: &ExprRef) -> OptResult<()> {
    check_references(expr, None).map_err(|source| {
        log::error!("Rule {} produced an invalid tree: {}", rule, source);
        OptError::InvalidReference {
            rule: rule.to_string(),
            source,
        }
        .into()
    })
}
