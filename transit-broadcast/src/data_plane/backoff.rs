//! Exponential retry backoff with a hard cap.

/// Backoff window in milliseconds for the given retry ordinal:
/// `base * 2^retry_count`, saturating, never above `cap_ms`.
pub fn backoff_ms(base_ms: u64, cap_ms: u64, retry_count: u8) -> u64 {
    let factor = 1u64.checked_shl(u32::from(retry_count)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(cap_ms)
}
