// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Bounded-attempt retry with exponential backoff and full jitter,
//! applied only to transport/timeout-class provider errors.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(10) }
    }
}

/// Full-jitter exponential backoff: a uniform random delay between zero
/// and `min(max_delay, base_delay * 2^attempt)`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy.base_delay.saturating_mul(1u32.checked_shl(attempt.min(20)).unwrap_or(u32::MAX));
    let capped = exp.min(policy.max_delay);
    let cap_ms = capped.as_millis().max(1) as u64;
    let jittered_ms = rand::thread_rng().gen_range(0..=cap_ms);
    Duration::from_millis(jittered_ms)
}

pub fn should_retry(policy: &RetryPolicy, attempt: u32) -> bool {
    attempt + 1 < policy.max_attempts
}
