//! Response classification.
//!
//! The SIS answers some failures with a 200 carrying an error document,
//! so HTTP status alone is not trustworthy. A successful body must show
//! one of the markers every real payload carries; anything else is
//! downgraded to a forbidden status so the retry layer treats it as a
//! soft failure.

use sispull_core::{Outcome, RequestDescriptor};

/// Substrings found in every genuine payload: a count response, a
/// token grant, or a record set.
const BODY_MARKERS: [&str; 3] = ["count", "access_token", "record"];

/// Decide whether an outcome is an acceptable answer for the request.
///
/// Streamed bodies cannot be inspected without consuming them, so a 2xx
/// stream is accepted as-is. Buffered 2xx bodies must carry one of the
/// payload markers; a marker wins even when the body also mentions
/// `message`, since record data can legitimately contain that word. A
/// markerless body (the SIS error shape) is rewritten to status 403 in
/// place.
pub fn accept(outcome: &mut Outcome, desc: &RequestDescriptor) -> bool {
    if !outcome.ok() {
        return false;
    }
    if desc.stream {
        return true;
    }

    let text = outcome.text();
    if !BODY_MARKERS.iter().any(|m| text.contains(m)) {
        log::debug!(
            "rejecting response for {}: body carries no payload marker",
            desc.entity_name
        );
        outcome.status = 403;
        return false;
    }
    true
}
