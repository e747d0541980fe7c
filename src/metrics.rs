use tracing::trace;

// Counters are emitted as trace events; no exporter is wired up.

pub fn cycle_completed(cycle: u64, elapsed_ms: u128) {
    trace!(
        target = "lowball.metrics",
        cycle = cycle,
        elapsed_ms = elapsed_ms as u64,
        "cycle_completed"
    );
}

pub fn listing_new(listing_id: &str) {
    trace!(target = "lowball.metrics", listing_id = listing_id, "listing_new");
}

pub fn message_sent(attempts: u32) {
    trace!(target = "lowball.metrics", attempts = attempts, "message_sent");
}

pub fn message_failed(attempts: u32) {
    trace!(target = "lowball.metrics", attempts = attempts, "message_failed");
}

pub fn session_refreshed() {
    trace!(target = "lowball.metrics", "session_refreshed");
}
