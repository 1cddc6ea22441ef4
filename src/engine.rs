use crate::clock::{SystemWallClock, WallClock};
use crate::config::ProfilerConfig;
use crate::distributor::MessageDistributor;
use crate::evaluate::ExpressionEvaluator;
use crate::logging::{JsonLineLogger, LogLevel};
use crate::measurement::Measurement;
use crate::router::MessageRouter;
use crate::telemetry::ProfilerTelemetry;
use serde_json::Value;
use std::sync::Arc;

/// Stand-alone profiler: wires the router to the distributor and exposes
/// the two operations callers drive — `apply` per message, `flush` on the
/// caller's cadence.
///
/// Persistence stays outside: callers take each flushed [`Measurement`],
/// build its key with [`RowKeyCodec`](crate::rowkey::RowKeyCodec), and
/// write key plus their own value serialization to the store.
pub struct Profiler {
    config: ProfilerConfig,
    router: MessageRouter,
    distributor: MessageDistributor,
    evaluator: Box<dyn ExpressionEvaluator>,
    log: JsonLineLogger,
    logged_route_failures: usize,
    clock: Arc<dyn WallClock>,
    messages_applied_total: u64,
    routes_total: u64,
    distribute_errors_total: u64,
    flush_errors_total: u64,
    measurements_emitted_total: u64,
}

impl Profiler {
    pub fn new(config: ProfilerConfig, evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        Self::with_clock(config, evaluator, Arc::new(SystemWallClock::new()))
    }

    /// Builds the profiler around an explicit clock (tests, replay).
    pub fn with_clock(
        config: ProfilerConfig,
        evaluator: Box<dyn ExpressionEvaluator>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            config,
            router: MessageRouter::new(),
            distributor: MessageDistributor::new(clock.clone()),
            evaluator,
            log: JsonLineLogger::default(),
            logged_route_failures: 0,
            clock,
            messages_applied_total: 0,
            routes_total: 0,
            distribute_errors_total: 0,
            flush_errors_total: 0,
            measurements_emitted_total: 0,
        }
    }

    /// Routes the message and applies it to every matching accumulator.
    /// A failure for one route never aborts its siblings.
    pub fn apply(&mut self, message: &Value) {
        self.messages_applied_total = self.messages_applied_total.saturating_add(1);
        let routes = self
            .router
            .route(message, &self.config, self.evaluator.as_ref());
        self.log_new_route_failures();
        self.routes_total = self.routes_total.saturating_add(routes.len() as u64);
        for route in &routes {
            let Some(definition) = self.config.definition(&route.profile_name) else {
                continue;
            };
            if let Err(error) = self.distributor.distribute(
                message,
                route,
                definition,
                self.evaluator.as_ref(),
            ) {
                self.distribute_errors_total = self.distribute_errors_total.saturating_add(1);
                let ts = self.clock.now_millis();
                let _ = self.log.log(
                    ts,
                    LogLevel::Warn,
                    &route.profile_name,
                    Some(&route.entity),
                    &format!("distribute failed: {error}"),
                );
            }
        }
    }

    /// Closes elapsed windows and returns their measurements, in identity
    /// order. Result-expression failures and TTL evictions are logged and
    /// counted, never raised.
    pub fn flush(&mut self) -> Vec<Measurement> {
        let outcome = self
            .distributor
            .flush(&self.config, self.evaluator.as_ref());
        let ts = self.clock.now_millis();
        for failure in &outcome.failures {
            self.flush_errors_total = self.flush_errors_total.saturating_add(1);
            let _ = self.log.log(
                ts,
                LogLevel::Warn,
                &failure.profile_name,
                Some(&failure.entity),
                &format!("result expression failed: {}", failure.error),
            );
        }
        if outcome.evicted > 0 {
            let _ = self.log.log(
                ts,
                LogLevel::Warn,
                "profiler",
                None,
                &format!("evicted {} idle accumulator(s) past TTL", outcome.evicted),
            );
        }
        self.measurements_emitted_total = self
            .measurements_emitted_total
            .saturating_add(outcome.measurements.len() as u64);
        outcome.measurements
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Merged counter snapshot across router, distributor, and engine.
    pub fn telemetry(&self) -> ProfilerTelemetry {
        ProfilerTelemetry {
            messages_applied_total: self.messages_applied_total,
            routes_total: self.routes_total,
            evaluation_errors_total: self
                .router
                .failure_total()
                .saturating_add(self.distribute_errors_total)
                .saturating_add(self.flush_errors_total),
            ttl_evictions_total: self.distributor.evictions_total(),
            measurements_emitted_total: self.measurements_emitted_total,
        }
    }

    /// Live accumulators currently held by the distributor.
    pub fn active_accumulators(&self) -> usize {
        self.distributor.active_count()
    }

    /// JSON-line event log (evaluation errors, evictions).
    pub fn event_log(&self) -> &JsonLineLogger {
        &self.log
    }

    pub fn event_log_mut(&mut self) -> &mut JsonLineLogger {
        &mut self.log
    }

    fn log_new_route_failures(&mut self) {
        let ts = self.clock.now_millis();
        let failures = self.router.failure_log();
        for failure in &failures[self.logged_route_failures..] {
            let _ = self.log.log(
                ts,
                LogLevel::Warn,
                &failure.profile_name,
                None,
                &format!(
                    "expression '{}' failed: {}",
                    failure.expression, failure.error
                ),
            );
        }
        self.logged_route_failures = failures.len();
    }
}
