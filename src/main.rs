use clap::Parser;
use tokio::net::TcpListener;

use legacy_proxy::config::{validate_config, Cli};
use legacy_proxy::lifecycle::{spawn_signal_listener, Shutdown};
use legacy_proxy::observability::{logging, metrics};
use legacy_proxy::policy::AllowList;
use legacy_proxy::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.resolve()?;

    logging::init(&config.observability.log_level);

    tracing::info!("legacy-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(field = error.field, message = %error.message, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    let transform = &config.transform;
    tracing::info!(
        strip_css = transform.strip_css,
        strip_js = transform.strip_js,
        max_source_width = ?transform.max_source_width,
        max_inline_width = ?transform.max_inline_width,
        block_cookies = transform.block_cookies,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let allow_list = AllowList::load_or_empty(config.allow_list.path.as_deref());

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let addr = config
        .socket_addr()
        .ok_or("bind address is not an IP address")?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    spawn_signal_listener(&shutdown);

    let server = HttpServer::new(config, allow_list)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
