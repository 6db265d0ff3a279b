/// Metrics and telemetry for linkgate
///
/// Prometheus-compatible counters for the access-token lifecycle:
/// - Token issuance and delivery
/// - Redemption outcomes (bound / resumed / mismatch / unknown)
/// - Silent device resumes
/// - Rate-limit rejections

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Access tokens issued (emails sent)
    pub static ref TOKENS_ISSUED_TOTAL: IntCounter = register_int_counter!(
        "linkgate_tokens_issued_total",
        "Total number of access tokens issued"
    )
    .unwrap();

    /// Token redemption attempts by outcome
    pub static ref REDEMPTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "linkgate_redemptions_total",
        "Total number of token redemption attempts",
        &["outcome"]
    )
    .unwrap();

    /// Silent resumes via device-fingerprint lookup
    pub static ref DEVICE_RESUMES_TOTAL: IntCounter = register_int_counter!(
        "linkgate_device_resumes_total",
        "Total number of sessions restored from a device fingerprint"
    )
    .unwrap();

    /// Issuance requests rejected by the rate limiter
    pub static ref RATE_LIMITED_TOTAL: IntCounter = register_int_counter!(
        "linkgate_rate_limited_total",
        "Total number of rate-limited issuance requests"
    )
    .unwrap();
}

/// Redemption outcome labels
pub mod outcome {
    pub const BOUND: &str = "bound";
    pub const RESUMED: &str = "resumed";
    pub const MISMATCH: &str = "mismatch";
    pub const UNKNOWN: &str = "unknown";
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
