use tracing::trace;

// Trace-level counters. A subscriber filtering on `remedy.metrics` can
// aggregate these without pulling an exporter into the binary.

pub fn provider_attempt(provider: &str, ok: bool) {
    trace!(
        target = "remedy.metrics",
        provider = provider,
        ok = ok,
        "provider_attempts_total_inc"
    );
}

pub fn patch_write(field: &'static str, ok: bool) {
    trace!(
        target = "remedy.metrics",
        field = field,
        ok = ok,
        "patch_writes_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "remedy.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}
