//! Request id generation.
//!
//! Ids are random v4 UUIDs rendered as lowercase hyphenated hex
//! (`8-4-4-4-12`). They only need to be unique among in-flight calls, so a
//! time-seeded generator stands in when the OS entropy source is unavailable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use uuid::Builder;

/// Generate a new request id.
pub fn new_request_id() -> String {
    let mut bytes = [0u8; 16];
    if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
        tracing::debug!(error = %e, "OS entropy unavailable, using fallback id generator");
        fill_fallback(&mut bytes);
    }
    format_v4(bytes)
}

fn format_v4(bytes: [u8; 16]) -> String {
    Builder::from_random_bytes(bytes)
        .into_uuid()
        .hyphenated()
        .to_string()
}

fn fill_fallback(bytes: &mut [u8; 16]) {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    #[allow(clippy::cast_possible_truncation)]
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let seed = nanos ^ COUNTER.fetch_add(1, Ordering::Relaxed).rotate_left(32);
    StdRng::seed_from_u64(seed).fill_bytes(bytes);
}
