//! Serve command - runs the auth helper until SIGINT/SIGTERM.

use anyhow::{Context as _, Result, bail};
use clap::Args;
use console::Style;

use kiosk_auth::ProxyServer;
use kiosk_config::KioskConfig;

use super::{Context, UpstreamArgs};

/// Arguments for the serve command.
///
/// CLI arguments override config file and environment values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path prefix forwarded to the printer (overrides config)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Allow cross-origin requests from any origin
    #[arg(long)]
    pub cors: bool,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

impl ServeArgs {
    fn overrides(&self) -> KioskConfig {
        let mut layer = KioskConfig::new();
        self.upstream.apply(&mut layer);
        layer.server.host = self.host.clone();
        layer.server.port = self.port;
        layer.server.path_prefix = self.prefix.clone();
        if self.cors {
            layer.server.cors = Some(true);
        }
        layer
    }
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let settings = super::load_settings(ctx, args.overrides())?;
    let config = super::proxy_config(&settings);
    let server = ProxyServer::new(config.clone()).context("Failed to create proxy")?;

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!(
            "Kiosk auth helper on http://{}{} → {}",
            config.bind_addr, config.path_prefix, config.passthrough.origin
        );
        println!("{}", dim.apply_to("Press Ctrl+C to stop"));
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut serving = tokio::spawn(server.serve_with_shutdown(async {
        shutdown_rx.await.ok();
    }));

    tokio::select! {
        // Only reachable if the listener failed (bind error) or the task died.
        joined = &mut serving => {
            joined
                .context("Proxy task panicked")?
                .context("Proxy server failed")?;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!(
        grace_secs = settings.shutdown_grace.as_secs(),
        "Shutdown signal received, draining in-flight requests"
    );
    shutdown_tx.send(()).ok();

    match tokio::time::timeout(settings.shutdown_grace, serving).await {
        Ok(joined) => {
            joined
                .context("Proxy task panicked")?
                .context("Proxy server failed")?;
            tracing::info!("Auth helper stopped");
            Ok(())
        }
        Err(_) => bail!(
            "In-flight requests did not finish within {}s, forcing exit",
            settings.shutdown_grace.as_secs()
        ),
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
