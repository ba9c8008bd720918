use anyhow::{Context, Result};
use bdx_bridge::{cli, config, openapi, rate_limit, routes, services, state, telemetry};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind bdx-bridge listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind bdx-bridge listener on {addr}"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    let config = config::GatewayConfig::from_env()?;
    let _log_guard = telemetry::init_tracing(config.log_dir.as_deref())?;

    let client = services::bdx::BdxClient::new(&config.bdx).context("failed to build BDX client")?;
    let session = Arc::new(
        services::bdx::SharedSession::open(client)
            .await
            .context("failed to log in to BDX")?,
    );

    let limiter = Arc::new(rate_limit::RateLimiter::per_minute(
        config.rate_limit_per_minute,
    ));
    let pruned = limiter.clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(rate_limit::RATE_LIMIT_WINDOW);
        pruned.retain_recent();
    });

    let state = state::AppState {
        config: config.clone(),
        source: session.clone(),
        limiter,
    };
    let app = routes::router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, rate_limit_per_minute = config.rate_limit_per_minute, "bdx-bridge listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    // The router (and its clone of the session) is gone once serve returns.
    match Arc::try_unwrap(session) {
        Ok(session) => {
            if let Err(err) = session.close().await {
                tracing::warn!(error = %err, "failed to close BDX session");
            }
        }
        Err(_) => tracing::warn!("BDX session still shared at shutdown; skipping logout"),
    }
    Ok(())
}
