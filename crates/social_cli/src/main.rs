//! Server entry point.
//!
//! # Responsibility
//! - Load settings from the environment and start logging.
//! - Migrate the database, open the pool and serve the HTTP router.

use anyhow::{anyhow, Context};
use log::info;
use social_api::{build_router, open_pool, AppState, RouterConfig};
use social_core::{core_version, init_logging, Argon2PasswordHasher, Settings};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("failed to load settings")?;

    let log_dir = settings
        .log_dir
        .as_ref()
        .map(|dir| {
            dir.to_str()
                .ok_or_else(|| anyhow!("LOG_DIR is not valid UTF-8: {}", dir.display()))
        })
        .transpose()?;
    init_logging(&settings.log_level, log_dir).map_err(|err| anyhow!(err))?;

    let pool = open_pool(&settings.database_path, settings.db_pool_size)
        .with_context(|| format!("failed to open {}", settings.database_path.display()))?;
    let state = AppState::new(pool, Argon2PasswordHasher::default());
    let router = build_router(state, &RouterConfig::from_settings(&settings));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "event=server_start module=cli status=ok version={} addr={} domain_url={} tls={}",
        core_version(),
        addr,
        settings.project_domain_url,
        settings.server_tls
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("event=server_stop module=cli status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!(
            "event=server_stop module=cli status=error error={}",
            err
        );
    }
}
