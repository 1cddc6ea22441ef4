use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised while evaluating a profile expression. A failure is
/// always scoped to one profile definition and must never stop the
/// message stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("no program registered for expression '{0}'")]
    UnknownExpression(String),
    #[error("message field '{0}' is missing")]
    MissingField(String),
    #[error("variable '{0}' is not bound")]
    MissingVariable(String),
    #[error("expression '{expression}' produced {actual}, expected a boolean")]
    NotABoolean { expression: String, actual: String },
    #[error("cannot apply '{operation}' to {lhs} and {rhs}")]
    TypeMismatch {
        operation: String,
        lhs: String,
        rhs: String,
    },
    #[error("entity expression '{0}' produced an empty entity")]
    EmptyEntity(String),
}

/// Context handed to the evaluator for one expression: the inbound message
/// plus, during accumulator updates, the accumulator's variables.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    message: &'a Value,
    variables: Option<&'a BTreeMap<String, Value>>,
}

impl<'a> EvalContext<'a> {
    /// Context for routing expressions, which see only the message.
    pub fn message_only(message: &'a Value) -> Self {
        Self {
            message,
            variables: None,
        }
    }

    /// Context for accumulator expressions, which also see the state.
    pub fn with_variables(message: &'a Value, variables: &'a BTreeMap<String, Value>) -> Self {
        Self {
            message,
            variables: Some(variables),
        }
    }

    pub fn message(&self) -> &'a Value {
        self.message
    }

    /// Resolves a dotted path against the message object.
    pub fn field(&self, path: &str) -> Option<&'a Value> {
        let mut current = self.message;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    pub fn variable(&self, name: &str) -> Option<&'a Value> {
        self.variables.and_then(|vars| vars.get(name))
    }
}

/// The expression capability consumed by the router and distributor.
///
/// The grammar behind an expression string is deliberately opaque: any
/// implementation that maps `(expression, context)` to a value can plug
/// in, from an embedded scripting engine to a compiled predicate tree.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, ctx: &EvalContext<'_>) -> Result<Value, EvaluationError>;

    fn evaluate_predicate(
        &self,
        expression: &str,
        ctx: &EvalContext<'_>,
    ) -> Result<bool, EvaluationError> {
        match self.evaluate(expression, ctx)? {
            Value::Bool(flag) => Ok(flag),
            other => Err(EvaluationError::NotABoolean {
                expression: expression.to_string(),
                actual: describe(&other),
            }),
        }
    }
}

/// Comparison operators supported by [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A pre-built expression tree run by the [`ScriptedEvaluator`].
///
/// Programs are registered against expression text rather than parsed
/// from it, so no grammar is defined here. The operation set mirrors what
/// profile definitions need: predicates over message fields, entity and
/// group extraction, and counter-style state updates.
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    Const(Value),
    Field(String),
    Var(String),
    Exists(String),
    Not(Box<Program>),
    All(Vec<Program>),
    Any(Vec<Program>),
    Compare {
        lhs: Box<Program>,
        op: CompareOp,
        rhs: Box<Program>,
    },
    Add(Box<Program>, Box<Program>),
}

impl Program {
    fn run(&self, ctx: &EvalContext<'_>) -> Result<Value, EvaluationError> {
        match self {
            Program::Const(value) => Ok(value.clone()),
            Program::Field(path) => ctx
                .field(path)
                .cloned()
                .ok_or_else(|| EvaluationError::MissingField(path.clone())),
            Program::Var(name) => ctx
                .variable(name)
                .cloned()
                .ok_or_else(|| EvaluationError::MissingVariable(name.clone())),
            Program::Exists(path) => Ok(Value::Bool(ctx.field(path).is_some())),
            Program::Not(inner) => Ok(Value::Bool(!truthy(&inner.run(ctx)?))),
            Program::All(children) => {
                for child in children {
                    if !truthy(&child.run(ctx)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Program::Any(children) => {
                for child in children {
                    if truthy(&child.run(ctx)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Program::Compare { lhs, op, rhs } => {
                let left = lhs.run(ctx)?;
                let right = rhs.run(ctx)?;
                compare(&left, *op, &right).map(Value::Bool)
            }
            Program::Add(lhs, rhs) => {
                let left = lhs.run(ctx)?;
                let right = rhs.run(ctx)?;
                add(&left, &right)
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Null => false,
        _ => true,
    }
}

fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> Result<bool, EvaluationError> {
    match op {
        CompareOp::Eq => Ok(lhs == rhs),
        CompareOp::Ne => Ok(lhs != rhs),
        _ => {
            let (left, right) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(left), Some(right)) => (left, right),
                _ => {
                    return Err(EvaluationError::TypeMismatch {
                        operation: "compare".to_string(),
                        lhs: describe(lhs),
                        rhs: describe(rhs),
                    })
                }
            };
            Ok(match op {
                CompareOp::Gt => left > right,
                CompareOp::Ge => left >= right,
                CompareOp::Lt => left < right,
                CompareOp::Le => left <= right,
                CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
            })
        }
    }
}

fn add(lhs: &Value, rhs: &Value) -> Result<Value, EvaluationError> {
    if let (Some(left), Some(right)) = (lhs.as_i64(), rhs.as_i64()) {
        return Ok(Value::from(left.saturating_add(right)));
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(left), Some(right)) => Ok(Value::from(left + right)),
        _ => Err(EvaluationError::TypeMismatch {
            operation: "add".to_string(),
            lhs: describe(lhs),
            rhs: describe(rhs),
        }),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

/// Deterministic evaluator backed by pre-registered programs.
///
/// The registry intentionally omits wall clocks, randomness, and I/O so
/// evaluation stays a pure function of the message and the accumulator
/// variables.
#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    programs: HashMap<String, Program>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a program under the expression text that names it.
    pub fn with_program(mut self, expression: impl Into<String>, program: Program) -> Self {
        self.programs.insert(expression.into(), program);
        self
    }

    pub fn register(&mut self, expression: impl Into<String>, program: Program) {
        self.programs.insert(expression.into(), program);
    }
}

impl ExpressionEvaluator for ScriptedEvaluator {
    fn evaluate(&self, expression: &str, ctx: &EvalContext<'_>) -> Result<Value, EvaluationError> {
        let program = self
            .programs
            .get(expression)
            .ok_or_else(|| EvaluationError::UnknownExpression(expression.to_string()))?;
        program.run(ctx)
    }
}
