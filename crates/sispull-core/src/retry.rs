//! Retry helpers: exponential pool backoff and the fixed-sleep
//! application-level wrapper.

use std::time::Duration;

use crate::transport::{Outcome, RequestDescriptor};

/// Pool backoff: `factor * 2^(attempt-1)` seconds.
pub fn backoff_duration(factor: u64, attempt: u32) -> Duration {
    Duration::from_secs(factor * 2u64.pow(attempt.saturating_sub(1)))
}

/// Application-level retry wrapper.
///
/// Invokes `send` up to `max_attempts` times with a fixed `sleep` between
/// attempts, stopping on the first 2xx outcome. The descriptor returned by
/// each attempt feeds the next one, so retry-context substituted by the
/// transport takes effect on the re-attempt. Exhaustion returns the last
/// outcome as-is; its body is logged for diagnostics.
pub fn retry_descriptor(
    max_attempts: u32,
    sleep: Duration,
    desc: RequestDescriptor,
    mut send: impl FnMut(RequestDescriptor) -> (Outcome, RequestDescriptor),
) -> (Outcome, RequestDescriptor) {
    let mut desc = desc;
    let mut attempt = 0u32;
    loop {
        let (outcome, returned) = send(desc);
        attempt += 1;
        if outcome.ok() || attempt >= max_attempts {
            if !outcome.ok() && !returned.stream {
                log::debug!("{}: giving up after {attempt} attempts: {}", returned.entity_name, outcome.text());
            }
            return (outcome, returned);
        }
        log::debug!(
            "{}: attempt {attempt}/{max_attempts} returned {}, retrying in {:?}",
            returned.entity_name,
            outcome.status,
            sleep
        );
        desc = returned;
        std::thread::sleep(sleep);
    }
}
