use std::time::Duration;

use rand::Rng;

/// Exponent cap. With a 30s base that tops out around 8.5 hours.
const MAX_EXPONENT: u32 = 10;

/// Jittered exponential delay before a failed job runs again.
///
/// `base * 2^attempt`, exponent capped, then scaled by a random factor in
/// [0.7, 1.3) so a burst of failures does not come back as a burst of
/// retries.
pub fn calculate_backoff_delay(attempt: i32, base_delay_secs: u32) -> Duration {
    let exponent = u32::try_from(attempt).unwrap_or(0).min(MAX_EXPONENT);
    let delay_secs = base_delay_secs.saturating_mul(2_u32.saturating_pow(exponent));

    let jitter = rand::thread_rng().gen_range(0.7..1.3);
    Duration::from_secs((f64::from(delay_secs) * jitter).round() as u64)
}
