use crate::config::ProfilerConfig;
use crate::evaluate::{EvalContext, EvaluationError, ExpressionEvaluator};
use crate::measurement::canonical_group;
use serde_json::Value;

/// One (profile, entity) destination for a message, plus the ordered
/// group values that further split the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRoute {
    pub profile_name: String,
    pub entity: String,
    pub groups: Vec<String>,
}

/// Audit entry recorded when one profile definition fails to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFailure {
    pub profile_name: String,
    pub expression: String,
    pub error: EvaluationError,
}

/// Matches messages against profile definitions.
///
/// A failure while evaluating one definition is recorded and skipped so
/// the remaining definitions still get their chance at the message; one
/// bad expression must not stop the stream.
#[derive(Debug, Default)]
pub struct MessageRouter {
    failures: Vec<RouteFailure>,
    failure_total: u64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one route per profile whose predicate holds, preserving
    /// definition order. Zero, one, or many routes may result.
    pub fn route(
        &mut self,
        message: &Value,
        config: &ProfilerConfig,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Vec<MessageRoute> {
        let ctx = EvalContext::message_only(message);
        let mut routes = Vec::new();
        'profiles: for definition in config.profiles() {
            match evaluator.evaluate_predicate(&definition.applies, &ctx) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(error) => {
                    self.record_failure(&definition.name, &definition.applies, error);
                    continue;
                }
            }
            let entity = match evaluator.evaluate(&definition.entity, &ctx) {
                Ok(value) => canonical_group(&value),
                Err(error) => {
                    self.record_failure(&definition.name, &definition.entity, error);
                    continue;
                }
            };
            if entity.is_empty() {
                self.record_failure(
                    &definition.name,
                    &definition.entity,
                    EvaluationError::EmptyEntity(definition.entity.clone()),
                );
                continue;
            }
            let mut groups = Vec::with_capacity(definition.group_by.len());
            for expression in &definition.group_by {
                match evaluator.evaluate(expression, &ctx) {
                    Ok(value) => groups.push(canonical_group(&value)),
                    Err(error) => {
                        self.record_failure(&definition.name, expression, error);
                        continue 'profiles;
                    }
                }
            }
            routes.push(MessageRoute {
                profile_name: definition.name.clone(),
                entity,
                groups,
            });
        }
        routes
    }

    /// Audit log of per-profile evaluation failures.
    pub fn failure_log(&self) -> &[RouteFailure] {
        &self.failures
    }

    pub fn failure_total(&self) -> u64 {
        self.failure_total
    }

    fn record_failure(&mut self, profile: &str, expression: &str, error: EvaluationError) {
        self.failure_total = self.failure_total.saturating_add(1);
        self.failures.push(RouteFailure {
            profile_name: profile.to_string(),
            expression: expression.to_string(),
            error,
        });
    }
}
