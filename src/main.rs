use anyhow::Result;
use grid_console::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }
    init_tracing();

    let cfg = Config::load()?;

    if cfg.auth.token.is_empty() || cfg.auth.token.starts_with("__SET_VIA_ENV") {
        anyhow::bail!(
            "SECURITY ERROR: GRIDCON__AUTH__TOKEN must be set to a secure random token. \
            Generate one with: openssl rand -base64 32"
        );
    }

    if cfg.auth.token == "devtoken" {
        warn!("Using 'devtoken' auth token - this is only safe for local development!");
    }

    let app_state = controller::AppState::new(cfg.clone())?;
    let app = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!(
            "WARNING: Server binding to 0.0.0.0 - operator API will be reachable from the network! \
            Bind to 127.0.0.1 unless behind a firewall/reverse proxy."
        );
    }

    info!(
        %addr,
        upstream = %cfg.upstream.base_url,
        push = %cfg.upstream.push_url,
        "starting Grid Console"
    );

    app_state.console.start();

    let console = app_state.console.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            telemetry::shutdown_signal().await;
            console.shutdown().await;
        })
        .await?;

    warn!("shutdown complete");
    Ok(())
}
