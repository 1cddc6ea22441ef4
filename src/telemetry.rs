/// Counter snapshot describing what the engine has processed so far.
///
/// TTL evictions and evaluation errors are reported here rather than as
/// errors: neither is fatal to the engine, but both are data-loss signals
/// operators should watch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerTelemetry {
    pub messages_applied_total: u64,
    pub routes_total: u64,
    pub evaluation_errors_total: u64,
    pub ttl_evictions_total: u64,
    pub measurements_emitted_total: u64,
}
