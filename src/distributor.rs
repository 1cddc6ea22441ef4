use crate::clock::WallClock;
use crate::config::{ProfileDefinition, ProfilerConfig};
use crate::evaluate::{EvalContext, EvaluationError, ExpressionEvaluator};
use crate::measurement::Measurement;
use crate::router::MessageRoute;
use crate::window::{TimeWindow, WindowError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

const SHARD_COUNT: usize = 16;

/// Errors raised while applying one routed message to its accumulator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DistributeError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Result-expression failure recorded while closing a window. The
/// accumulator is still removed; the measurement for that key is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushFailure {
    pub profile_name: String,
    pub entity: String,
    pub error: EvaluationError,
}

/// Outcome of one flush sweep: closed-window measurements in identity
/// order, per-key result failures, and the number of TTL evictions.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub measurements: Vec<Measurement>,
    pub failures: Vec<FlushFailure>,
    pub evicted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct AccumulatorKey {
    profile_name: String,
    entity: String,
    groups: Vec<String>,
    window_index: u64,
}

#[derive(Debug)]
struct Accumulator {
    window: TimeWindow,
    variables: BTreeMap<String, Value>,
    last_touched_millis: u64,
}

type Shard = Mutex<HashMap<AccumulatorKey, Accumulator>>;

/// Owns the live per-(profile, entity, groups, window) accumulator state.
///
/// The key space is split across a fixed set of shards, each behind its
/// own lock: mutation for one key is serialized by its shard, while keys
/// on different shards proceed independently. Sweeps snapshot the keys to
/// touch before mutating, so nothing is removed mid-iteration.
pub struct MessageDistributor {
    shards: Vec<Shard>,
    clock: Arc<dyn WallClock>,
    evictions_total: AtomicU64,
}

impl MessageDistributor {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            clock,
            evictions_total: AtomicU64::new(0),
        }
    }

    /// Applies a routed message to the accumulator for the current window,
    /// creating it on the first message. Update expressions run in the
    /// order messages arrive for the key; they are not assumed to be
    /// commutative.
    pub fn distribute(
        &self,
        message: &Value,
        route: &MessageRoute,
        definition: &ProfileDefinition,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<(), DistributeError> {
        let now = self.clock.now_millis();
        let window = TimeWindow::containing(now, definition.window_duration_millis)?;
        let key = AccumulatorKey {
            profile_name: route.profile_name.clone(),
            entity: route.entity.clone(),
            groups: route.groups.clone(),
            window_index: window.index(),
        };
        let mut shard = self.shards[self.shard_index(&key)].lock();
        if let Some(accumulator) = shard.get(&key) {
            if now.saturating_sub(accumulator.last_touched_millis) >= definition.ttl_millis() {
                // Idle past the TTL: the stale state must not leak into a
                // revived key, so the next message starts fresh.
                shard.remove(&key);
                self.evictions_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        match shard.get_mut(&key) {
            Some(accumulator) => {
                let staged = run_updates(message, &accumulator.variables, definition, evaluator)?;
                accumulator.variables.extend(staged);
                accumulator.last_touched_millis = now;
            }
            None => {
                let ctx = EvalContext::message_only(message);
                let mut variables = BTreeMap::new();
                for (name, expression) in &definition.init {
                    variables.insert(name.clone(), evaluator.evaluate(expression, &ctx)?);
                }
                let staged = run_updates(message, &variables, definition, evaluator)?;
                variables.extend(staged);
                shard.insert(
                    key,
                    Accumulator {
                        window,
                        variables,
                        last_touched_millis: now,
                    },
                );
            }
        }
        Ok(())
    }

    /// Closes every accumulator whose window has elapsed and evicts every
    /// accumulator idle past its TTL. Still-open, recently-touched state
    /// is left untouched.
    ///
    /// Windows close here, not on arrival: the caller's flush cadence
    /// bounds emission latency.
    pub fn flush(
        &self,
        config: &ProfilerConfig,
        evaluator: &dyn ExpressionEvaluator,
    ) -> FlushOutcome {
        let now = self.clock.now_millis();
        let mut outcome = FlushOutcome::default();
        for shard in &self.shards {
            let mut shard = shard.lock();
            let candidates: Vec<AccumulatorKey> = shard
                .iter()
                .filter(|(key, accumulator)| {
                    self.is_expired(key, accumulator, config, now)
                        || accumulator.window.has_elapsed(now)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in candidates {
                let Some(accumulator) = shard.remove(&key) else {
                    continue;
                };
                if self.is_expired(&key, &accumulator, config, now) {
                    outcome.evicted += 1;
                    self.evictions_total.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let Some(definition) = config.definition(&key.profile_name) else {
                    continue;
                };
                let message = Value::Null;
                let ctx = EvalContext::with_variables(&message, &accumulator.variables);
                match evaluator.evaluate(&definition.result, &ctx) {
                    Ok(value) => outcome.measurements.push(
                        Measurement::new(key.profile_name, key.entity, accumulator.window)
                            .with_groups(key.groups)
                            .with_value(value),
                    ),
                    Err(error) => outcome.failures.push(FlushFailure {
                        profile_name: key.profile_name,
                        entity: key.entity,
                        error,
                    }),
                }
            }
        }
        outcome
            .measurements
            .sort_by(|a, b| a.identity().cmp(&b.identity()));
        outcome
    }

    /// Number of live accumulators across all shards.
    pub fn active_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Cumulative TTL evictions since construction.
    pub fn evictions_total(&self) -> u64 {
        self.evictions_total.load(Ordering::Relaxed)
    }

    fn is_expired(
        &self,
        key: &AccumulatorKey,
        accumulator: &Accumulator,
        config: &ProfilerConfig,
        now: u64,
    ) -> bool {
        match config.definition(&key.profile_name) {
            Some(definition) => {
                now.saturating_sub(accumulator.last_touched_millis) >= definition.ttl_millis()
            }
            // The profile was removed from the config; its state can never
            // be closed, so it is treated as expired.
            None => true,
        }
    }

    fn shard_index(&self, key: &AccumulatorKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }
}

fn run_updates(
    message: &Value,
    variables: &BTreeMap<String, Value>,
    definition: &ProfileDefinition,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<BTreeMap<String, Value>, EvaluationError> {
    // Updates are staged against the pre-update variables and committed
    // together, so a failing expression leaves the accumulator unchanged.
    let ctx = EvalContext::with_variables(message, variables);
    let mut staged = BTreeMap::new();
    for (name, expression) in &definition.update {
        staged.insert(name.clone(), evaluator.evaluate(expression, &ctx)?);
    }
    Ok(staged)
}
