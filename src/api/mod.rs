/// API route handlers
use crate::context::AppContext;
use axum::Router;

pub mod admin;
pub mod auth;
pub mod middleware;

/// Build all API routes
pub fn routes() -> Router<AppContext> {
    Router::new().merge(auth::routes()).merge(admin::routes())
}
