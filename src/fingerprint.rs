/// Device fingerprint derivation
///
/// Produces a stable, reproducible identifier for a device/network pair from
/// request headers. This is a coarse convenience hash, not a security-grade
/// device attestation: no salt, no secret, fully deterministic across
/// process restarts.
use sha2::{Digest, Sha256};

/// Derive a device fingerprint from user agent, client IP and the
/// Accept-Language header. A missing Accept-Language hashes as the empty
/// string so the output stays stable for clients that omit it.
pub fn derive(user_agent: &str, ip: &str, accept_language: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(accept_language.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}
