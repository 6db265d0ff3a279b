/// Linkgate - device-bound passwordless access control server
///
/// Issues one-time email links, permanently binds each link to the first
/// device/IP that redeems it, and transparently re-authenticates returning
/// visitors via a device fingerprint.

mod access;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod fingerprint;
mod jobs;
mod mailer;
mod metrics;
mod rate_limit;
mod server;
mod store;
mod validation;

use config::ServerConfig;
use context::AppContext;
use error::GateResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> GateResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    __    _       __                __
   / /   (_)___  / /______ _____ _/ /____
  / /   / / __ \/ //_/ __ `/ __ `/ __/ _ \
 / /___/ / / / / ,< / /_/ / /_/ / /_/  __/
/_____/_/_/ /_/_/|_|\__, /\__,_/\__/\___/
                   /____/
        Device-bound access control v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
