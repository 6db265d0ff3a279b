/// Background task implementations
use crate::{context::AppContext, error::GateResult};

/// Cleanup expired server-side HTTP sessions
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> GateResult<u64> {
    ctx.sessions.cleanup_expired().await
}

/// Cleanup expired OTP codes
pub async fn cleanup_expired_otps(ctx: &AppContext) -> GateResult<u64> {
    ctx.otps.cleanup_expired().await
}
