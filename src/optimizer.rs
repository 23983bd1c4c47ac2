use std::rc::Rc;

use crate::error::OptResult;
use crate::expr::ExprRef;
use crate::heuristic::Pipeline;
use crate::mapping::{QueryMapping, QueryPolicy};

/// Knobs of one optimizer invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Upper bound on rounds of a fixed-point stage.
    pub max_iterations: usize,
    /// Run the reference validity checker after every rule.
    pub validate_references: bool,
    /// Whether the target dialect supports an offset clause. Without one, paged selects are
    /// rewritten to nested top-n selects.
    pub supports_skip: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            validate_references: cfg!(debug_assertions),
            supports_skip: true,
        }
    }
}

impl OptimizerConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_validate_references(mut self, validate_references: bool) -> Self {
        self.validate_references = validate_references;
        self
    }

    pub fn with_supports_skip(mut self, supports_skip: bool) -> Self {
        self.supports_skip = supports_skip;
        self
    }
}

/// Collaborators and configuration shared by every rule of one invocation.
#[derive(Clone)]
pub struct OptimizerContext {
    mapping: Rc<dyn QueryMapping>,
    policy: Rc<dyn QueryPolicy>,
    config: OptimizerConfig,
}

impl OptimizerContext {
    pub fn new(mapping: Rc<dyn QueryMapping>, policy: Rc<dyn QueryPolicy>) -> Self {
        Self {
            mapping,
            policy,
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mapping(&self) -> &dyn QueryMapping {
        &*self.mapping
    }

    pub fn policy(&self) -> &dyn QueryPolicy {
        &*self.policy
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

/// Runs the standard pipeline over `expr`.
pub fn optimize(expr: &ExprRef, context: &OptimizerContext) -> OptResult<ExprRef> {
    Pipeline::standard(context.config()).optimize(expr, context)
}
