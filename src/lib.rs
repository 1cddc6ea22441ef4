//! Windrow: a profiler windowing engine with a decodable, salted row-key
//! codec.
//!
//! Messages arrive as already-deserialized JSON records; the router
//! matches them against profile definitions, the distributor evolves
//! per-(profile, entity, window) accumulators, and closed windows emit
//! measurements whose identities the row-key codec serializes for a
//! sorted key-value store.

pub mod clock;
pub mod config;
pub mod distributor;
pub mod engine;
pub mod evaluate;
pub mod logging;
pub mod measurement;
pub mod router;
pub mod rowkey;
pub mod telemetry;
pub mod window;

pub use clock::{ManualWallClock, SystemWallClock, WallClock};
pub use config::{
    load_profiler_config, ConfigError, ProfileDefinition, ProfilerConfig, DEFAULT_TTL_MULTIPLIER,
};
pub use distributor::{DistributeError, FlushFailure, FlushOutcome, MessageDistributor};
pub use engine::Profiler;
pub use evaluate::{
    CompareOp, EvalContext, EvaluationError, ExpressionEvaluator, Program, ScriptedEvaluator,
};
pub use logging::{JsonLineLogger, LogFile, LogLevel, LogRotationPolicy, LoggingError};
pub use measurement::{canonical_group, Measurement, MeasurementIdentity};
pub use router::{MessageRoute, MessageRouter, RouteFailure};
pub use rowkey::{
    encode_salt, CodecError, RowKeyCodec, DEFAULT_SALT_DIVISOR, DEFAULT_WINDOW_DURATION_MILLIS,
    MAGIC_NUMBER, VERSION,
};
pub use telemetry::ProfilerTelemetry;
pub use window::{windows_between, TimeWindow, WindowError};
