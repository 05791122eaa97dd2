//! Expression evaluation port and registry
//!
//! Expressions are compiled and evaluated by the host; the engine only holds
//! opaque tokens. The registry remembers which tokens exist so they can be
//! released at teardown, and deduplicates string expressions by source text
//! so two metrics dimensioned by the same expression share one label slot.

use crate::request::RequestInfo;
use crate::Result;
use std::collections::HashMap;
use tracing::warn;

/// Opaque handle to a host-compiled expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprToken(pub u32);

/// Host port for compiling and evaluating label/value expressions.
pub trait ExpressionEval {
    /// Compile `source` and return a token for later evaluation.
    fn compile(&mut self, source: &str) -> Result<ExprToken>;

    /// Evaluate a string-valued expression against the current request.
    fn eval_string(&mut self, token: ExprToken, request: &RequestInfo) -> Result<String>;

    /// Evaluate an integer-valued expression against the current request.
    fn eval_int(&mut self, token: ExprToken, request: &RequestInfo) -> Result<i64>;

    /// Release a compiled expression.
    fn release(&mut self, token: ExprToken);
}

/// A registered string expression and the label slot order it was assigned.
#[derive(Debug, Clone)]
pub struct StringExpression {
    pub token: ExprToken,
    pub source: String,
}

/// Compiled-expression bookkeeping for one configuration.
///
/// String expressions feed custom label slots: the position of a unique
/// source text in registration order is its slot offset past the standard
/// labels. Integer expressions feed metric values and are not deduplicated.
#[derive(Default)]
pub struct ExpressionRegistry {
    strings: Vec<StringExpression>,
    by_source: HashMap<String, usize>,
    ints: Vec<ExprToken>,
}

impl ExpressionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a string expression, reusing an existing slot for a repeated
    /// source text. Returns the slot offset, or `None` if compilation failed.
    pub fn add_string(
        &mut self,
        evaluator: &mut dyn ExpressionEval,
        source: &str,
    ) -> Option<usize> {
        if let Some(&position) = self.by_source.get(source) {
            return Some(position);
        }
        match evaluator.compile(source) {
            Ok(token) => {
                let position = self.strings.len();
                self.by_source.insert(source.to_string(), position);
                self.strings.push(StringExpression {
                    token,
                    source: source.to_string(),
                });
                Some(position)
            }
            Err(e) => {
                warn!(expression = source, error = %e, "cannot create an expression");
                None
            }
        }
    }

    /// Register an integer-valued metric expression.
    pub fn add_int(
        &mut self,
        evaluator: &mut dyn ExpressionEval,
        source: &str,
    ) -> Option<ExprToken> {
        match evaluator.compile(source) {
            Ok(token) => {
                self.ints.push(token);
                Some(token)
            }
            Err(e) => {
                warn!(expression = source, error = %e, "cannot create a value expression");
                None
            }
        }
    }

    pub fn strings(&self) -> &[StringExpression] {
        &self.strings
    }

    /// Number of unique string expressions, i.e. the custom label count.
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Release every compiled expression back to the host.
    pub fn release_all(&mut self, evaluator: &mut dyn ExpressionEval) {
        for expression in self.strings.drain(..) {
            evaluator.release(expression.token);
        }
        self.by_source.clear();
        for token in self.ints.drain(..) {
            evaluator.release(token);
        }
    }
}
